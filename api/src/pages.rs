//! HTML pages for the reply-link landing and note form.

use checkin_core::alerts::MAX_NOTE_CHARS;
use checkin_core::checkins::CheckInValue;

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="robots" content="noindex">
<title>{title}</title>
<style>
body {{ font-family: system-ui, sans-serif; max-width: 480px; margin: 60px auto; padding: 0 20px; line-height: 1.5; }}
h1 {{ font-size: 1.4em; }}
label {{ display: block; margin-top: 12px; font-weight: 500; }}
textarea {{ width: 100%; padding: 8px; margin-top: 4px; box-sizing: border-box; min-height: 96px; }}
button {{ margin-top: 16px; padding: 10px 24px; background: #111; color: #fff; border: none; cursor: pointer; font-size: 1em; }}
.info {{ color: #666; font-size: 0.9em; margin-top: 8px; }}
.urgent {{ border-left: 4px solid #b00020; padding-left: 12px; }}
</style>
</head>
<body>
{body}
</body>
</html>"#,
        title = html_escape(title),
    )
}

fn value_phrase(value: CheckInValue) -> &'static str {
    match value {
        CheckInValue::Better => "feeling better",
        CheckInValue::Same => "about the same",
        CheckInValue::Worse => "feeling worse",
    }
}

/// Confirmation after a reply link, with an optional note form bound to a
/// note-purpose token.
pub fn render_reply_recorded(day: i32, value: CheckInValue, note_token: &str) -> String {
    let body = format!(
        r#"<h1>Thanks, we've recorded your day {day} check-in</h1>
<p>You told us you're {phrase}.</p>
<form method="POST" action="/checkin/note">
<input type="hidden" name="token" value="{token}">
<label>Anything you'd like to add? (optional)
<textarea name="note" maxlength="{max_chars}"></textarea></label>
<button type="submit">Send note</button>
</form>
<p class="info">Notes are read by our team during business hours. They are not monitored for emergencies.</p>"#,
        phrase = value_phrase(value),
        token = html_escape(note_token),
        max_chars = MAX_NOTE_CHARS,
    );
    layout("Check-in recorded", &body)
}

pub fn render_note_thanks() -> String {
    layout(
        "Thanks for your note",
        "<h1>Thanks for your note</h1>\n<p>We've added it to your check-in.</p>",
    )
}

/// Shown when a note mentions symptoms that need prompt clinical attention.
pub fn render_safety_notice() -> String {
    layout(
        "Please seek care",
        r#"<h1>Please contact a clinician promptly</h1>
<div class="urgent">
<p>Some of what you described can need prompt medical attention, such as changes in bladder or bowel control, numbness around the groin, leg weakness that is getting worse, or fever with back pain.</p>
<p>Please contact your doctor or an urgent care service today. If symptoms are severe or sudden, call your local emergency number.</p>
</div>
<p class="info">We've saved your note and paused further automated check-ins.</p>"#,
    )
}

/// Generic failure page. Never says why the link was rejected.
pub fn render_link_error() -> String {
    layout(
        "Link not valid",
        "<h1>This link is no longer valid</h1>\n<p>It may have expired or already been replaced. No action is needed.</p>",
    )
}

pub fn render_temporary_error() -> String {
    layout(
        "Please try again",
        "<h1>Something went wrong</h1>\n<p>We couldn't save your response just now. Please try the link again later.</p>",
    )
}
