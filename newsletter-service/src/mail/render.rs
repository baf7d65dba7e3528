//! Plain-text rendering of a content item for one recipient.

use crate::model::Content;

/// Build the message body sent to `to`.
///
/// A "read more" link is appended when `base_url` is set.
pub fn render_body(to: &str, content: &Content, base_url: Option<&str>) -> String {
    let mut body = format!("Hi {to},\n\n{}\n", content.body.trim_end());

    if let Some(base) = base_url {
        body.push_str(&format!(
            "\nRead the full content here: {}/{}\n",
            base.trim_end_matches('/'),
            content.id
        ));
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentId, ContentStatus, TopicId};
    use chrono::Utc;

    fn content() -> Content {
        Content {
            id: ContentId::new(),
            topic_id: TopicId::new(),
            title: "Issue #1".to_string(),
            body: "Welcome to the first issue.\n\n".to_string(),
            scheduled_time: Utc::now(),
            status: ContentStatus::Pending,
            sent_at: None,
        }
    }

    #[test]
    fn test_render_without_link() {
        let c = content();
        let body = render_body("a@example.com", &c, None);
        assert_eq!(body, "Hi a@example.com,\n\nWelcome to the first issue.\n");
    }

    #[test]
    fn test_render_with_link() {
        let c = content();
        let body = render_body("a@example.com", &c, Some("http://localhost:8080/api/content/"));
        assert!(body.ends_with(&format!(
            "Read the full content here: http://localhost:8080/api/content/{}\n",
            c.id
        )));
    }
}
