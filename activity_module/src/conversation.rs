//! Render a work item's activity history as a single HTML document.
//!
//! The document is stored as an attachment named `conversation.html` on
//! the work item, so the record viewer offers it as a downloadable file
//! rather than inline markup.

use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

use crate::records::{Activity, ResourceRef};
use crate::store::{ProjectStore, StoreError};

pub const CONVERSATION_ATTACHMENT_NAME: &str = "conversation.html";

/// Split a description into visible lines and the trailing quoted block.
///
/// Quoting starts at the first line prefixed with `>` and carries
/// forward: interleaved non-quoted lines inside a reply chain stay with
/// the quoted block.
pub fn split_quoted(description: &str) -> (Vec<&str>, Vec<&str>) {
    let mut visible = Vec::new();
    let mut quoted = Vec::new();
    let mut in_quote = false;
    for line in description.lines() {
        if line.starts_with('>') {
            in_quote = true;
        }
        if in_quote {
            quoted.push(line);
        } else {
            visible.push(line);
        }
    }
    (visible, quoted)
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://[^\s<]+").expect("valid url pattern"))
}

/// Turn bare URLs in already-escaped text into anchors.
fn autolink(escaped: &str) -> String {
    url_pattern()
        .replace_all(escaped, |captures: &regex::Captures<'_>| {
            let url = &captures[0];
            format!("<a href=\"{url}\">{url}</a>")
        })
        .into_owned()
}

fn lines_to_html(lines: &[&str]) -> String {
    lines
        .iter()
        .map(|line| autolink(&escape_html(line)))
        .collect::<Vec<_>>()
        .join("<br/>")
}

fn render_activity_fragment(
    store: &ProjectStore,
    activity: &Activity,
    database: &str,
) -> Result<Option<String>, StoreError> {
    let description = activity.description.as_deref().unwrap_or("");
    if description.trim().is_empty() {
        return Ok(None);
    }
    let (visible, quoted) = split_quoted(description);

    let type_name = match activity.activity_type_id {
        Some(type_id) => store
            .activity_type(type_id)?
            .map(|activity_type| activity_type.name)
            .unwrap_or_default(),
        None => String::new(),
    };
    let contact = contact_label(store, activity)?;
    let date = activity.dtstart.format("%Y-%m-%d %H:%M").to_string();

    let mut fragment = String::new();
    fragment.push_str("<div class=\"activity\">\n");
    let _ = write!(
        fragment,
        "<div class=\"activity-header\"><b>{}</b>, {}</div>\n",
        escape_html(&type_name),
        date
    );
    fragment.push_str("<table class=\"activity-meta\">\n");
    let _ = write!(
        fragment,
        "<tr><td class=\"label\">Code:</td><td>{}</td><td class=\"label\">Contact:</td><td>{}</td></tr>\n",
        escape_html(&activity.code),
        escape_html(&contact)
    );
    let _ = write!(
        fragment,
        "<tr><td class=\"label\">Date:</td><td>{}</td><td class=\"label\">State:</td><td>{}</td></tr>\n",
        date, activity.state
    );
    let _ = write!(
        fragment,
        "<tr><td class=\"label\">Subject:</td><td colspan=\"3\">{}</td></tr>\n",
        escape_html(activity.subject.as_deref().unwrap_or(""))
    );
    fragment.push_str("</table>\n");

    let attachments = store.attachments_for_resource(&ResourceRef::activity(activity.id))?;
    if !attachments.is_empty() {
        fragment.push_str("<div class=\"activity-attachments\">");
        for (index, attachment) in attachments.iter().enumerate() {
            if index > 0 {
                fragment.push_str(" | ");
            }
            let _ = write!(
                fragment,
                "<a href=\"/{database}/ir/attachment/{}\">{}</a>",
                attachment.id,
                escape_html(&attachment.name)
            );
        }
        fragment.push_str("</div>\n");
    }

    let _ = write!(
        fragment,
        "<div class=\"activity-body\">{}</div>\n",
        lines_to_html(&visible)
    );
    if !quoted.is_empty() {
        let _ = write!(
            fragment,
            "<a href=\"#\" class=\"quote-toggle\" onclick=\"return toggleQuote('quoted-{id}');\">show quoted text</a>\n<div class=\"activity-quoted\" id=\"quoted-{id}\" style=\"display:none\">{body}</div>\n",
            id = activity.id,
            body = lines_to_html(&quoted)
        );
    }
    fragment.push_str("<hr/>\n</div>\n");
    Ok(Some(fragment))
}

fn contact_label(store: &ProjectStore, activity: &Activity) -> Result<String, StoreError> {
    if let Some(party) = store.activity_contacts(activity.id)?.into_iter().next() {
        return Ok(party.name);
    }
    if let Some(employee_id) = activity.employee_id {
        if let Some(employee) = store.employee(employee_id)? {
            if let Some(party) = store.party(employee.party_id)? {
                return Ok(party.name);
            }
        }
    }
    Ok(String::new())
}

/// Render the conversation document for a work item: every attached
/// activity's fragment, in storage order, inside the static shell.
pub fn render_conversation(
    store: &ProjectStore,
    work_item_id: i64,
    database: &str,
) -> Result<String, StoreError> {
    let activities = store.activities_for_resource(&ResourceRef::work(work_item_id))?;
    let mut fragments = String::new();
    for activity in &activities {
        if let Some(fragment) = render_activity_fragment(store, activity, database)? {
            fragments.push_str(&fragment);
        }
    }
    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8"/>
<title>Conversation</title>
<style>
body {{ font-family: sans-serif; margin: 16px; color: #222; }}
.activity-header {{ font-size: 1.1em; }}
.activity-meta td {{ font-size: 0.85em; color: #778899; padding-right: 12px; }}
.activity-meta td.label {{ color: #000; }}
.activity-attachments {{ font-size: 0.85em; margin: 4px 0; }}
.activity-quoted {{ color: #666; border-left: 2px solid #ccc; padding-left: 8px; margin-top: 4px; }}
.quote-toggle {{ font-size: 0.85em; }}
</style>
<script>
function toggleQuote(id) {{
  var block = document.getElementById(id);
  if (!block) {{ return false; }}
  block.style.display = block.style.display === 'none' ? 'block' : 'none';
  return false;
}}
</script>
</head>
<body>
{fragments}</body>
</html>
"#
    ))
}

/// Render and store the conversation as the work item's
/// `conversation.html` attachment, replacing any previous rendering.
pub fn attach_conversation(
    store: &ProjectStore,
    work_item_id: i64,
    database: &str,
) -> Result<i64, StoreError> {
    let html = render_conversation(store, work_item_id, database)?;
    let resource = ResourceRef::work(work_item_id);
    store.delete_attachments_named(&resource, CONVERSATION_ATTACHMENT_NAME)?;
    store.insert_attachment(CONVERSATION_ATTACHMENT_NAME, &resource, html.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ActivityDraft, ActivityState, WorkItemDraft, WorkKind};
    use tempfile::TempDir;

    fn store() -> (TempDir, ProjectStore) {
        let temp = TempDir::new().expect("tempdir");
        let store = ProjectStore::new(temp.path().join("project.db")).expect("store");
        (temp, store)
    }

    #[test]
    fn quoted_block_carries_forward_across_plain_lines() {
        let (visible, quoted) = split_quoted("line1\n>quoted1\nOn Monday, Ann wrote:\n>quoted2");
        assert_eq!(visible, vec!["line1"]);
        assert_eq!(quoted, vec![">quoted1", "On Monday, Ann wrote:", ">quoted2"]);
    }

    #[test]
    fn quoted_section_is_collapsed_and_keyed_by_activity() {
        let (_temp, store) = store();
        let work_id = store
            .insert_work_item(&WorkItemDraft {
                name: "roof".to_string(),
                kind: WorkKind::Task,
                ..Default::default()
            })
            .expect("work item");
        let activity_id = store
            .insert_activity(&ActivityDraft {
                description: Some("line1\n>quoted1\n>quoted2".to_string()),
                state: ActivityState::Done,
                resource: Some(ResourceRef::work(work_id)),
                ..Default::default()
            })
            .expect("activity");

        let html = render_conversation(&store, work_id, "project").expect("render");
        assert!(html.contains("<div class=\"activity-body\">line1</div>"));
        assert!(html.contains(&format!("id=\"quoted-{activity_id}\"")));
        assert!(html.contains("style=\"display:none\""));
        assert!(html.contains("&gt;quoted1<br/>&gt;quoted2"));
        assert!(html.contains("function toggleQuote"));
    }

    #[test]
    fn bare_urls_become_anchors_in_both_sections() {
        let (_temp, store) = store();
        let work_id = store
            .insert_work_item(&WorkItemDraft {
                name: "roof".to_string(),
                kind: WorkKind::Task,
                ..Default::default()
            })
            .expect("work item");
        store
            .insert_activity(&ActivityDraft {
                description: Some(
                    "see https://example.com/photos\n>was https://example.com/old".to_string(),
                ),
                resource: Some(ResourceRef::work(work_id)),
                ..Default::default()
            })
            .expect("activity");

        let html = render_conversation(&store, work_id, "project").expect("render");
        assert!(html.contains("<a href=\"https://example.com/photos\">https://example.com/photos</a>"));
        assert!(html.contains("<a href=\"https://example.com/old\">https://example.com/old</a>"));
    }

    #[test]
    fn activities_without_description_are_skipped() {
        let (_temp, store) = store();
        let work_id = store
            .insert_work_item(&WorkItemDraft {
                name: "roof".to_string(),
                kind: WorkKind::Task,
                ..Default::default()
            })
            .expect("work item");
        store
            .insert_activity(&ActivityDraft {
                subject: Some("silent".to_string()),
                resource: Some(ResourceRef::work(work_id)),
                ..Default::default()
            })
            .expect("activity");

        let html = render_conversation(&store, work_id, "project").expect("render");
        assert!(!html.contains("silent"));
    }

    #[test]
    fn attach_conversation_replaces_previous_rendering() {
        let (_temp, store) = store();
        let work_id = store
            .insert_work_item(&WorkItemDraft {
                name: "roof".to_string(),
                kind: WorkKind::Task,
                ..Default::default()
            })
            .expect("work item");
        store
            .insert_activity(&ActivityDraft {
                description: Some("first".to_string()),
                resource: Some(ResourceRef::work(work_id)),
                ..Default::default()
            })
            .expect("activity");

        attach_conversation(&store, work_id, "project").expect("attach");
        let second = attach_conversation(&store, work_id, "project").expect("attach again");

        let resource = ResourceRef::work(work_id);
        let attachments = store.attachments_for_resource(&resource).expect("list");
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].id, second);
        assert_eq!(attachments[0].name, CONVERSATION_ATTACHMENT_NAME);

        let stored = store.attachment(second).expect("query").expect("exists");
        let body = String::from_utf8(stored.data).expect("utf8");
        assert!(body.contains("first"));
    }
}
