//! Run-completion webhook notifications.
//!
//! The webhook target is explicit configuration handed in at startup; an
//! absent URL disables the notifier. Delivery is best-effort: callers log a
//! failure and move on, since the run itself already finished.

use serde_json::json;

use crate::metrics::RunSummary;

pub struct Notifier {
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self { webhook_url }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    /// Post the run summary as JSON to the configured webhook.
    pub fn notify(&self, summary: &RunSummary) -> anyhow::Result<()> {
        let Some(url) = &self.webhook_url else {
            return Ok(());
        };

        let text = match (summary.val_loss.last(), summary.val_acc.last()) {
            (Some(loss), Some(acc)) => format!(
                "training run finished: {} epochs, final val loss {:.6}, val acc {:.4}",
                summary.val_loss.len(),
                loss,
                acc
            ),
            _ => "training run finished".to_string(),
        };

        let client = reqwest::blocking::Client::new();
        client
            .post(url)
            .json(&json!({ "text": text, "summary": summary }))
            .send()?
            .error_for_status()?;
        Ok(())
    }
}
