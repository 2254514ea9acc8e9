use super::{ExportDocument, DISPLAY_TIME};

const STYLE: &str = r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }
    body {
        font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
        line-height: 1.6;
        color: #333;
        background: #eef0f7;
        padding: 20px;
    }
    .container {
        max-width: 900px;
        margin: 0 auto;
        background: #fff;
        border-radius: 16px;
        box-shadow: 0 10px 30px rgba(0, 0, 0, 0.1);
        overflow: hidden;
    }
    .header {
        background: linear-gradient(135deg, #4f46e5 0%, #7c3aed 100%);
        color: #fff;
        padding: 32px 30px;
        text-align: center;
    }
    .header h1 { font-size: 2em; margin-bottom: 8px; }
    .conversation { padding: 30px; }
    .message { margin-bottom: 24px; }
    .message.user { text-align: right; }
    .message-content {
        display: inline-block;
        max-width: 85%;
        padding: 14px 18px;
        border-radius: 16px;
        text-align: left;
        white-space: pre-wrap;
        word-wrap: break-word;
    }
    .user .message-content { background: #667eea; color: #fff; }
    .assistant .message-content { background: #f8f9fa; border: 1px solid #e2e8f0; }
    .system .message-content { background: #fff7e6; border: 1px dashed #f0b429; }
    .timestamp { font-size: 0.85em; color: #718096; margin: 4px 12px; font-style: italic; }
    .empty { color: #718096; text-align: center; }
    .footer {
        background: #f7fafc;
        padding: 16px 30px;
        text-align: center;
        color: #718096;
        border-top: 1px solid #e2e8f0;
    }
"#;

/// Escape text for element content and attribute values.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Self-contained page: inline CSS, no scripts, every turn escaped.
pub(crate) fn render_html(doc: &ExportDocument) -> String {
    let agent = escape_html(&doc.agent_id);
    let model = escape_html(&doc.model);
    let exported = doc.exported_at.format(DISPLAY_TIME);

    let mut out = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Conversation - {model} - {agent}</title>
<style>{STYLE}</style>
</head>
<body>
<div class="container">
<div class="header">
<h1>GrokChat Conversation</h1>
<p><strong>Agent:</strong> {agent}</p>
<p><strong>Model:</strong> {model}</p>
<p><strong>Exported:</strong> {exported}</p>
</div>
<div class="conversation">
"#
    );

    if doc.messages.is_empty() {
        out.push_str("<p class=\"empty\">No messages.</p>\n");
    }
    for turn in &doc.messages {
        out.push_str(&format!(
            "<div class=\"message {role}\">\n<div class=\"timestamp\">{ts}</div>\n<div class=\"message-content\">{content}</div>\n</div>\n",
            role = turn.role.as_str(),
            ts = turn.timestamp.format(DISPLAY_TIME),
            content = escape_html(&turn.content),
        ));
    }

    out.push_str(&format!(
        "</div>\n<div class=\"footer\">\n<p>Generated by GrokChat | Total Messages: {}</p>\n</div>\n</div>\n</body>\n</html>\n",
        doc.messages.len()
    ));
    out
}
