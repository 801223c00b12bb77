use sha2::{Digest, Sha256};

/// A compiled configuration archive: the native files, the canonical
/// tar serialization, and its content checksum.
#[derive(Debug, Clone)]
pub struct Archive {
    pub files: Vec<(String, String)>,
    pub data: Vec<u8>,
    pub checksum: String,
}

/// Build the canonical tar archive for a set of rendered files.
///
/// Entries are sorted by path and carry fixed metadata (mtime 0,
/// uid/gid 0, mode 0644) so identical input always yields identical
/// bytes and checksum.
pub fn build(mut files: Vec<(String, String)>) -> Archive {
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in &files {
        let bytes = content.as_bytes();
        let mut header = tar::Header::new_ustar();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_cksum();
        // set_path via append_data so long names are handled uniformly
        builder
            .append_data(&mut header, name, bytes)
            .expect("writing tar entry to memory cannot fail");
    }
    let data = builder
        .into_inner()
        .expect("finishing in-memory tar cannot fail");

    let checksum = hex::encode(Sha256::digest(&data));
    Archive {
        files,
        data,
        checksum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_input_identical_checksum() {
        let files = vec![
            ("etc/config/system".to_string(), "config system\n".to_string()),
            ("etc/config/network".to_string(), "config interface\n".to_string()),
        ];
        let a = build(files.clone());
        let b = build(files);
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_entry_order_is_normalized() {
        let forward = build(vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        let reverse = build(vec![
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        assert_eq!(forward.checksum, reverse.checksum);
    }

    #[test]
    fn test_content_changes_checksum() {
        let a = build(vec![("f".to_string(), "1".to_string())]);
        let b = build(vec![("f".to_string(), "2".to_string())]);
        assert_ne!(a.checksum, b.checksum);
    }
}
