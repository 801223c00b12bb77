use crate::models::{RemoteTemplate, TemplateSubscription};

/// Fetch template data from a remote template library.
pub async fn fetch_remote_template(url: &str) -> anyhow::Result<RemoteTemplate> {
    let response = reqwest::get(url).await?.error_for_status()?;
    let data = response.json::<RemoteTemplate>().await?;
    Ok(data)
}

/// Notify the given subscribers that a template changed or was
/// deleted. Fire-and-forget: runs after the mutation committed, and a
/// failing subscriber never rolls back or blocks the core operation.
/// The list is loaded before the mutation so deletes still notify.
pub fn notify_subscribers(subscribers: Vec<TemplateSubscription>, template_id: String) {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        for subscription in subscribers {
            let result = client
                .post(format!(
                    "{}/api/v1/templates/synchronize",
                    subscription.subscriber.trim_end_matches('/')
                ))
                .form(&[("template_id", template_id.as_str())])
                .send()
                .await;
            if let Err(e) = result {
                tracing::warn!(
                    "Subscriber notification to {} failed: {}",
                    subscription.subscriber,
                    e
                );
            }
        }
    });
}

/// Subscribe (or unsubscribe) this server at the remote library a
/// template was imported from. Best-effort, dispatched after the
/// import committed.
pub fn subscribe_at_origin(origin_url: String, remote_id: String, subscriber: String, subscribe: bool) {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let result = client
            .post(format!("{}/subscription", origin_url.trim_end_matches('/')))
            .form(&[
                ("template", remote_id.as_str()),
                ("subscriber", subscriber.as_str()),
                ("subscribe", if subscribe { "true" } else { "false" }),
            ])
            .send()
            .await;
        if let Err(e) = result {
            tracing::warn!("Subscription callback to {} failed: {}", origin_url, e);
        }
    });
}
