use crate::db::models::{Notification, NotificationKind};
use crate::db::notification_repository::NotificationRepository;
use crate::mail::mailer::Mailer;
use crate::mail::templates::EmailMessage;

/// Send the same notification to several recipients.
///
/// Notifications are a side effect of the request that triggers them, so a
/// failure is logged rather than returned.
pub async fn fan_out(
    notifications: &dyn NotificationRepository,
    recipients: &[String],
    kind: NotificationKind,
    title: &str,
    message: &str,
    link: Option<String>,
) {
    if recipients.is_empty() {
        return;
    }

    let batch: Vec<Notification> = recipients
        .iter()
        .map(|recipient| Notification::new(recipient, kind, title, message, link.clone()))
        .collect();
    let count = batch.len();

    match notifications.insert_many(batch).await {
        Ok(()) => tracing::debug!(count, ?kind, "Notifications delivered"),
        Err(e) => tracing::warn!(count, ?kind, "Failed to store notifications: {e}"),
    }
}

/// Deliver an email without failing the caller.
pub async fn send_mail(mailer: &dyn Mailer, message: EmailMessage) {
    let to = message.to.clone();
    if let Err(e) = mailer.send(message).await {
        tracing::warn!(%to, "Failed to send email: {e}");
    }
}
