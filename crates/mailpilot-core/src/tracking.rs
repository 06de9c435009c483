//! Open-tracking pixel injection

use mailpilot_common::types::MessageId;

/// Build the public pixel URL for a message
pub fn pixel_url(base_url: &str, id: MessageId) -> String {
    format!("{}/track/open?mid={}", base_url.trim_end_matches('/'), id)
}

/// Append an invisible 1x1 tracking image to an HTML body.
///
/// The pixel goes just before `</body>` when present, otherwise at the end.
/// Without a base URL the body is returned untouched (tracking disabled).
pub fn inject_pixel(html: &str, id: MessageId, base_url: Option<&str>) -> String {
    let Some(base) = base_url else {
        return html.to_string();
    };

    let tag = format!(
        r#"<img src="{}" width="1" height="1" style="display:none;" alt=""/>"#,
        pixel_url(base, id)
    );

    match html.rfind("</body>") {
        Some(idx) => format!("{}{}{}", &html[..idx], tag, &html[idx..]),
        None => format!("{}{}", html, tag),
    }
}
