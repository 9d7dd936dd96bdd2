use crate::engine::SyncStatus;
use crate::health::ConnectionState;
use crate::models::{Report, StatsResponse};
use crate::presenter::Presenter;
use crate::snapshot::ListSnapshot;
use crate::stats::build_stats;
use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// Entries younger than this get the `new-post` highlight.
const FRESH_SECS: i64 = 5;

pub const EMOJI_CHOICES: [&str; 5] = ["😊", "😐", "😞", "🤒", "😴"];

/// Keeps the rendered feed fragment in step with the engine's snapshot.
pub struct HtmlPresenter {
    feed: RwLock<String>,
}

impl Default for HtmlPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlPresenter {
    pub fn new() -> Self {
        Self {
            feed: RwLock::new(render_feed(&ListSnapshot::default(), Utc::now())),
        }
    }

    pub fn feed(&self) -> String {
        match self.feed.read() {
            Ok(feed) => feed.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Presenter for HtmlPresenter {
    fn render(&self, snapshot: &ListSnapshot) {
        let html = render_feed(snapshot, Utc::now());
        match self.feed.write() {
            Ok(mut feed) => *feed = html,
            Err(poisoned) => *poisoned.into_inner() = html,
        }
    }
}

pub struct PageNotice<'a> {
    pub kind: &'a str,
    pub message: &'a str,
}

pub fn notice_for(code: &str) -> Option<PageNotice<'static>> {
    let (kind, message) = match code {
        "saved" => ("ok", "Report saved."),
        "missing" => ("error", "Please enter your name and what you feel."),
        "duplicate" => ("error", "This report was already submitted a few minutes ago."),
        "check_failed" => ("error", "Could not check for duplicates, nothing was saved. Try again."),
        "insert_failed" => ("error", "Could not save the report. Try again."),
        _ => return None,
    };
    Some(PageNotice { kind, message })
}

pub fn render_index(
    feed: &str,
    status: &SyncStatus,
    notice: Option<&PageNotice<'_>>,
    reporter: &str,
) -> String {
    let notice_html = notice
        .map(|n| {
            format!(
                r#"<div class="notice" data-type="{}">{}</div>"#,
                n.kind,
                escape_html(n.message)
            )
        })
        .unwrap_or_default();
    let emoji_buttons: String = EMOJI_CHOICES
        .iter()
        .map(|emoji| {
            format!(
                r#"<button class="emoji-btn" type="submit" name="emoji" value="{emoji}">{emoji}</button>"#
            )
        })
        .collect();

    INDEX_HTML
        .replace("{{STATUS}}", &render_status(status))
        .replace("{{NOTICE}}", &notice_html)
        .replace("{{REPORTER}}", &escape_html(reporter))
        .replace("{{EMOJI_BUTTONS}}", &emoji_buttons)
        .replace("{{FEED}}", feed)
}

pub fn render_status(status: &SyncStatus) -> String {
    let message = match status.state {
        ConnectionState::Connected => "Live",
        ConnectionState::Connecting => "Connecting...",
        ConnectionState::Degraded => "Live updates paused, refreshing periodically",
        ConnectionState::Disconnected => "Offline, showing last known reports",
    };
    let detail = status
        .last_error
        .as_deref()
        .filter(|_| status.state != ConnectionState::Connected)
        .map(|err| format!(r#" <span class="status-detail">{}</span>"#, escape_html(err)))
        .unwrap_or_default();
    format!(
        r#"<div class="status" id="status" data-state="{}"><span>{}</span>{}<button class="dismiss" type="button" aria-label="Dismiss">×</button></div>"#,
        status.state.as_str(),
        message,
        detail
    )
}

/// List and aggregates for one snapshot.
pub fn render_feed(snapshot: &ListSnapshot, now: DateTime<Utc>) -> String {
    let items: String = snapshot.iter().map(|report| render_item(report, now)).collect();
    let list = if items.is_empty() {
        r#"<p class="empty">No reports yet.</p>"#.to_string()
    } else {
        items
    };
    format!(
        r#"<section class="feed-list" id="report-list">{}</section>{}"#,
        list,
        render_stats(&build_stats(snapshot))
    )
}

fn render_item(report: &Report, now: DateTime<Utc>) -> String {
    let fresh = (now - report.created_at).num_seconds() < FRESH_SECS;
    let comment = report
        .comment
        .as_deref()
        .map(|c| format!(r#"<div class="report-comment">"{}"</div>"#, escape_html(c)))
        .unwrap_or_default();
    format!(
        r#"<div id="report-{id}" class="report-item{fresh}"><div class="report-header"><span class="reporter">{reporter}</span><span class="emoji">{emoji}</span><span class="label">{label}</span><span class="detail">Detail: {detail}</span><span class="time">{time}</span></div>{comment}</div>"#,
        id = report.id,
        fresh = if fresh { " new-post" } else { "" },
        reporter = escape_html(&report.reporter),
        emoji = escape_html(report.emoji.as_deref().unwrap_or("❓")),
        label = escape_html(if report.label.is_empty() {
            "Not specified"
        } else {
            report.label.as_str()
        }),
        detail = escape_html(report.detail.as_deref().unwrap_or("N/A")),
        time = report.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        comment = comment,
    )
}

fn render_stats(stats: &StatsResponse) -> String {
    let top: String = stats
        .top_labels
        .iter()
        .map(|l| format!("<div>{}: {}</div>", escape_html(&l.label), l.count))
        .collect();
    let details: String = stats
        .detail_counts
        .iter()
        .map(|d| format!("<div>Detail {}: {}</div>", escape_html(&d.detail), d.count))
        .collect();
    format!(
        r#"<section class="panel"><div class="stat" id="top-labels"><span class="title">Most reported</span>{}</div><div class="stat" id="detail-counts"><span class="title">By detail</span>{}</div></section>"#,
        if top.is_empty() { "<div>No reports yet</div>".to_string() } else { top },
        if details.is_empty() { "<div>No detail data</div>".to_string() } else { details },
    )
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>How are you feeling?</title>
  <style>
    :root {
      --bg-1: #f8f3e6;
      --ink: #2b2a28;
      --accent: #ff6b4a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.86);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: linear-gradient(135deg, var(--bg-1), #ffe9d4 60%, #f9f2e9 100%);
      color: var(--ink);
      font-family: "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 32px 18px 48px;
    }

    .app {
      width: min(860px, 100%);
      background: var(--card);
      border-radius: 28px;
      box-shadow: var(--shadow);
      padding: 36px;
      display: grid;
      gap: 24px;
    }

    h1 {
      font-family: "Georgia", serif;
      margin: 0;
    }

    form {
      display: grid;
      gap: 12px;
    }

    input, select, textarea {
      font: inherit;
      padding: 10px 14px;
      border-radius: 12px;
      border: 1px solid rgba(47, 72, 88, 0.2);
    }

    button {
      appearance: none;
      border: none;
      border-radius: 999px;
      padding: 12px 18px;
      font-size: 1rem;
      font-weight: 600;
      cursor: pointer;
    }

    .btn-submit {
      background: var(--accent);
      color: white;
    }

    .emoji-group {
      display: flex;
      gap: 8px;
    }

    .emoji-btn {
      background: white;
      font-size: 1.5rem;
      padding: 8px 12px;
    }

    .status, .notice {
      display: flex;
      gap: 10px;
      align-items: center;
      padding: 10px 14px;
      border-radius: 14px;
      font-size: 0.95rem;
      background: rgba(47, 72, 88, 0.08);
    }

    .status[data-state="connected"] { color: #2d7a4b; }
    .status[data-state="degraded"] { color: #a86a00; }
    .status[data-state="disconnected"] { color: #c63b2b; }
    .notice[data-type="error"] { color: #c63b2b; }
    .notice[data-type="ok"] { color: #2d7a4b; }

    .status .dismiss {
      margin-left: auto;
      background: transparent;
      padding: 0 6px;
    }

    .status.hidden {
      display: none;
    }

    .report-item {
      background: white;
      border-radius: 18px;
      padding: 14px 18px;
      margin-bottom: 10px;
      border: 1px solid rgba(47, 72, 88, 0.08);
      transition: background 1s ease;
    }

    .report-item.new-post {
      background: #fff1e8;
    }

    .report-header {
      display: flex;
      flex-wrap: wrap;
      gap: 10px;
    }

    .reporter { font-weight: 600; }
    .time { margin-left: auto; color: #8b857d; font-size: 0.85rem; }
    .report-comment { margin-top: 6px; font-style: italic; }

    .panel {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
      gap: 16px;
    }

    .stat {
      background: white;
      border-radius: 18px;
      padding: 18px;
      display: grid;
      gap: 6px;
    }

    .stat .title {
      font-size: 0.85rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: #8b857d;
    }
  </style>
</head>
<body>
  <main class="app">
    <header>
      <h1>How are you feeling?</h1>
    </header>

    {{STATUS}}
    {{NOTICE}}

    <form id="report-form" method="post" action="/reports">
      <input name="reporter" placeholder="Your name" value="{{REPORTER}}" required />
      <select name="label">
        <option>Headache</option>
        <option>Fever</option>
        <option>Cough</option>
        <option>Fatigue</option>
        <option>Nausea</option>
        <option>Good mood</option>
        <option>Low mood</option>
      </select>
      <select name="detail">
        <option value="">Intensity (optional)</option>
        <option>1</option>
        <option>2</option>
        <option>3</option>
        <option>4</option>
        <option>5</option>
      </select>
      <textarea name="comment" placeholder="Comment (optional)"></textarea>
      <div class="emoji-group">{{EMOJI_BUTTONS}}</div>
      <button class="btn-submit" type="submit">Send report</button>
    </form>

    <div id="feed">{{FEED}}</div>
  </main>

  <script>
    const statusEl = document.getElementById('status');
    const feedEl = document.getElementById('feed');

    statusEl.querySelector('.dismiss').addEventListener('click', () => {
      statusEl.classList.add('hidden');
    });

    const refreshStatus = async () => {
      const res = await fetch('/api/status');
      if (!res.ok) {
        return;
      }
      const status = await res.json();
      if (statusEl.dataset.state !== status.state) {
        statusEl.dataset.state = status.state;
        statusEl.classList.remove('hidden');
        statusEl.querySelector('span').textContent = {
          connected: 'Live',
          connecting: 'Connecting...',
          degraded: 'Live updates paused, refreshing periodically',
          disconnected: 'Offline, showing last known reports'
        }[status.state];
      }
    };

    const refreshFeed = async () => {
      const res = await fetch('/partials/feed');
      if (res.ok) {
        feedEl.innerHTML = await res.text();
      }
    };

    setInterval(() => {
      refreshFeed().catch(() => {});
      refreshStatus().catch(() => {});
    }, 3000);
  </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn report(id: i64, created_at: DateTime<Utc>) -> Report {
        Report {
            id,
            created_at,
            reporter: "<b>Ada</b>".into(),
            label: "cough".into(),
            detail: None,
            comment: Some("it's \"bad\"".into()),
            emoji: None,
        }
    }

    #[test]
    fn escape_html_covers_special_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#039;Jerry&#039;&lt;/a&gt;"
        );
    }

    #[test]
    fn feed_escapes_user_text_and_applies_fallbacks() {
        let now = Utc::now();
        let snapshot = ListSnapshot::from_records(vec![report(1, now - Duration::minutes(10))], 100);
        let html = render_feed(&snapshot, now);

        assert!(html.contains("&lt;b&gt;Ada&lt;/b&gt;"));
        assert!(!html.contains("<b>Ada</b>"));
        assert!(html.contains("it&#039;s &quot;bad&quot;"));
        assert!(html.contains("❓"));
        assert!(html.contains("Detail: N/A"));
        assert!(!html.contains("new-post"));
    }

    #[test]
    fn fresh_reports_are_highlighted() {
        let now = Utc::now();
        let snapshot = ListSnapshot::from_records(vec![report(1, now - Duration::seconds(1))], 100);
        assert!(render_feed(&snapshot, now).contains("report-item new-post"));
    }

    #[test]
    fn empty_feed_shows_placeholders() {
        let html = render_feed(&ListSnapshot::default(), Utc::now());
        assert!(html.contains("No reports yet."));
        assert!(html.contains("No detail data"));
    }

    #[test]
    fn presenter_tracks_latest_snapshot() {
        let presenter = HtmlPresenter::new();
        assert!(presenter.feed().contains("No reports yet."));

        let snapshot = ListSnapshot::from_records(vec![report(7, Utc::now())], 100);
        presenter.render(&snapshot);
        assert!(presenter.feed().contains(r#"id="report-7""#));
    }

    #[test]
    fn index_includes_status_notice_and_prefill() {
        let status = SyncStatus {
            state: ConnectionState::Degraded,
            last_error: Some("channel closed".into()),
            ..SyncStatus::default()
        };
        let notice = notice_for("duplicate");
        let html = render_index("<div>feed</div>", &status, notice.as_ref(), "Ada \"A\"");

        assert!(html.contains(r#"data-state="degraded""#));
        assert!(html.contains("channel closed"));
        assert!(html.contains("already submitted"));
        assert!(html.contains(r#"value="Ada &quot;A&quot;""#));
        assert!(html.contains("<div>feed</div>"));
        assert!(notice_for("bogus").is_none());
    }
}
