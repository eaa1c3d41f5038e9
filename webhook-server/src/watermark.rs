//! Viewport watermark overlay for HTML pages.
//!
//! Stamps a fixed, full-viewport layer showing `"<name> ／ <timestamp>"`,
//! rotated and faint, over a light grid. The layer ignores pointer events
//! and sits above everything else on the page.

/// Separator between the user name and the timestamp.
pub const SEPARATOR: &str = " ／ ";

/// Class on the overlay root element.
pub const OVERLAY_CLASS: &str = "watermark-overlay";

/// Class on the element carrying the visible label.
pub const LABEL_CLASS: &str = "watermark-label";

const OVERLAY_STYLE: &str = "position:fixed;top:0;left:0;width:100vw;height:100vh;\
pointer-events:none;z-index:2147483647;overflow:hidden;\
display:flex;align-items:center;justify-content:center;\
background-image:linear-gradient(rgba(0,0,0,0.03) 1px,transparent 1px),\
linear-gradient(90deg,rgba(0,0,0,0.03) 1px,transparent 1px);\
background-size:40px 40px;";

const LABEL_STYLE: &str = "transform:rotate(-30deg);opacity:0.15;\
font-size:32px;font-weight:bold;color:#000;white-space:nowrap;user-select:none;";

/// Visible label text for a user and timestamp.
pub fn watermark_text(user_name: &str, date_time: &str) -> String {
    format!("{user_name}{SEPARATOR}{date_time}")
}

/// Markup for a single overlay element.
pub fn render_overlay(user_name: &str, date_time: &str) -> String {
    format!(
        r#"<div class="{OVERLAY_CLASS}" aria-hidden="true" style="{OVERLAY_STYLE}"><div class="{LABEL_CLASS}" style="{LABEL_STYLE}">{}</div></div>"#,
        escape_html(&watermark_text(user_name, date_time))
    )
}

/// Insert one overlay into `document`.
///
/// Goes just before the last `</body>` when there is one, otherwise at the
/// end. Existing overlays are left alone, so each call adds another.
pub fn stamp_watermark(document: &mut String, user_name: &str, date_time: &str) {
    let overlay = render_overlay(user_name, date_time);

    match find_body_close(document) {
        Some(index) => document.insert_str(index, &overlay),
        None => document.push_str(&overlay),
    }
}

/// Byte offset of the last `</body>`, matched case-insensitively.
fn find_body_close(document: &str) -> Option<usize> {
    document.to_ascii_lowercase().rfind("</body>")
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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
