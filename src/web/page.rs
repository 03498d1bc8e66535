//! Server-rendered chat page.

use std::fmt::Write;

use crate::app::{Notice, NoticeLevel, SystemStatus};
use crate::session::{ChatMessage, Role, SessionState};

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; display: flex; min-height: 100vh; }
aside { width: 300px; padding: 1rem; background: #f4f5f7; border-right: 1px solid #ddd; }
main { flex: 1; padding: 1rem 2rem; display: flex; flex-direction: column; }
.transcript { flex: 1; overflow-y: auto; }
.bubble { max-width: 70%; padding: .6rem .9rem; border-radius: 12px; margin: .4rem 0; }
.user { background: #2563eb; color: #fff; margin-left: auto; }
.assistant { background: #eef0f3; }
.time { font-size: .75rem; opacity: .7; margin-top: .25rem; }
.notice { padding: .5rem .75rem; border-radius: 6px; margin: .4rem 0; }
.notice-info { background: #e0ecff; } .notice-success { background: #dcfce7; }
.notice-warning { background: #fef9c3; } .notice-error { background: #fee2e2; }
form.chat { display: flex; gap: .5rem; } form.chat input { flex: 1; padding: .5rem; }
"#;

/// Renders the full page.
pub fn render_page(status: &SystemStatus, messages: &[ChatMessage], notices: &[Notice]) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\">");
    html.push_str("<title>RagBot - Chat with your documents</title><style>");
    html.push_str(STYLE);
    html.push_str("</style></head><body><aside><h2>Documents</h2>");
    html.push_str(
        "<form action=\"/documents\" method=\"post\" enctype=\"multipart/form-data\">\
         <input type=\"file\" name=\"files\" accept=\".pdf,application/pdf\" multiple>\
         <button type=\"submit\">Process Documents</button></form>",
    );
    html.push_str("<h3>System Status</h3>");
    render_status(&mut html, status);
    html.push_str(
        "<form action=\"/clear\" method=\"post\"><button type=\"submit\">Clear Chat</button></form>",
    );
    html.push_str("</aside><main><h1>RagBot</h1>");
    for notice in notices {
        let _ = write!(
            html,
            "<div class=\"notice notice-{}\">{}</div>",
            level_class(notice.level),
            html_escape::encode_text(&notice.message)
        );
    }
    html.push_str("<div class=\"transcript\">");
    for message in messages {
        render_message(&mut html, message);
    }
    html.push_str("</div>");
    html.push_str(
        "<form class=\"chat\" action=\"/chat\" method=\"post\">\
         <input type=\"text\" name=\"message\" placeholder=\"Ask a question about your documents...\" autofocus>\
         <button type=\"submit\">Send</button></form>",
    );
    html.push_str("</main></body></html>");
    html
}

fn render_status(html: &mut String, status: &SystemStatus) {
    let state = match status.state {
        SessionState::Ready => "Ready: answers use your documents",
        SessionState::NoIndex => "Waiting for documents",
    };
    let _ = write!(
        html,
        "<ul><li>{}</li><li>Index loaded: {}</li><li>Saved copy on disk: {}</li>\
         <li>RAG chain active: {}</li><li>Chunks indexed: {}</li><li>Embeddings: {}</li></ul>",
        state,
        yes_no(status.index_ready),
        yes_no(status.persisted_copy_exists),
        yes_no(status.chain_active),
        status.chunk_count,
        html_escape::encode_text(&status.embedding_model)
    );
}

fn render_message(html: &mut String, message: &ChatMessage) {
    let class = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let _ = write!(
        html,
        "<div class=\"bubble {}\"><div>{}</div><div class=\"time\">{}</div></div>",
        class,
        escape_multiline(&message.content),
        html_escape::encode_text(&message.timestamp)
    );
}

/// Escapes HTML and turns newlines into `<br>`.
pub(crate) fn escape_multiline(text: &str) -> String {
    html_escape::encode_text(text)
        .replace("\r\n", "\n")
        .replace('\n', "<br>")
}

fn level_class(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Info => "info",
        NoticeLevel::Success => "success",
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> SystemStatus {
        SystemStatus {
            state: SessionState::NoIndex,
            index_ready: false,
            persisted_copy_exists: false,
            chain_active: false,
            chunk_count: 0,
            index_name: "doc_index".to_string(),
            embedding_model: "hashing-crc32-768".to_string(),
        }
    }

    #[test]
    fn message_content_is_escaped_with_line_breaks() {
        assert_eq!(
            escape_multiline("<b>hi</b>\nthere & more"),
            "&lt;b&gt;hi&lt;/b&gt;<br>there &amp; more"
        );
    }

    #[test]
    fn page_shows_transcript_and_notices() {
        let messages = vec![ChatMessage {
            role: Role::User,
            content: "What is <this>?".to_string(),
            timestamp: "3:07 PM".to_string(),
        }];
        let notices = vec![Notice {
            level: NoticeLevel::Success,
            message: "Documents processed successfully!".to_string(),
        }];
        let html = render_page(&status(), &messages, &notices);
        assert!(html.contains("What is &lt;this&gt;?"));
        assert!(html.contains("3:07 PM"));
        assert!(html.contains("notice-success"));
        assert!(html.contains("Process Documents"));
        assert!(html.contains("Clear Chat"));
    }

    #[test]
    fn status_panel_reports_chain_separately_from_index() {
        let html = render_page(
            &SystemStatus {
                index_ready: true,
                persisted_copy_exists: true,
                chunk_count: 3,
                ..status()
            },
            &[],
            &[],
        );
        assert!(html.contains("<li>Index loaded: yes</li>"));
        assert!(html.contains("<li>RAG chain active: no</li>"));
    }
}
