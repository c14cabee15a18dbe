//! Pure rendering of the log panel
//!
//! [`render`] turns a freshly fetched tail plus the current scroll geometry
//! into the lines to show and the next geometry. It never touches a terminal,
//! so the scroll-follow rules are testable on their own.

use crate::log_store::LogLevel;
use serde_json::Value;

/// Distance from the bottom (in view units) that still counts as "at bottom"
pub const DEFAULT_BOTTOM_THRESHOLD: u32 = 50;

/// Height of one rendered entry in view units
pub const DEFAULT_LINE_HEIGHT: u32 = 20;

/// Shown when an entry has no usable timestamp
pub const MISSING_TIMESTAMP: &str = "--:--:--";

/// Level as displayed; unknown level strings are kept verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayLevel {
    Known(LogLevel),
    Other(String),
}

impl DisplayLevel {
    pub fn label(&self) -> &str {
        match self {
            DisplayLevel::Known(level) => level.as_str(),
            DisplayLevel::Other(raw) => raw,
        }
    }
}

/// One entry ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayEntry {
    pub timestamp: String,
    pub level: DisplayLevel,
    pub message: String,
    /// Compact JSON of a non-empty payload
    pub data: Option<String>,
}

impl DisplayEntry {
    /// Decode leniently: missing or mistyped fields become placeholders
    pub fn from_value(value: &Value) -> Self {
        let timestamp = value
            .get("timestamp")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(MISSING_TIMESTAMP)
            .to_string();

        let level = match value.get("level").and_then(Value::as_str) {
            Some(raw) => LogLevel::parse(raw)
                .map(DisplayLevel::Known)
                .unwrap_or_else(|| DisplayLevel::Other(raw.to_string())),
            None => DisplayLevel::Known(LogLevel::Info),
        };

        let message = match value.get("message") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let data = match value.get("data") {
            Some(Value::Object(map)) if map.is_empty() => None,
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };

        Self {
            timestamp,
            level,
            message,
            data,
        }
    }

    /// Single-line text form: `[timestamp] LEVEL message`
    pub fn line(&self) -> String {
        format!("[{}] {} {}", self.timestamp, self.level.label(), self.message)
    }
}

/// The rendered panel contents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedLog {
    pub entries: Vec<DisplayEntry>,
}

impl RenderedLog {
    pub fn from_values(values: &[Value]) -> Self {
        Self {
            entries: values.iter().map(DisplayEntry::from_value).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scroll geometry and follow preference of the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    pub auto_scroll_enabled: bool,
    /// Whether the view was at the bottom after the last render or scroll
    pub is_at_bottom: bool,
    pub scroll_top: u32,
    pub viewport_height: u32,
    pub content_height: u32,
    pub line_height: u32,
    pub bottom_threshold: u32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(400)
    }
}

impl ViewState {
    pub fn new(viewport_height: u32) -> Self {
        Self {
            auto_scroll_enabled: true,
            is_at_bottom: true,
            scroll_top: 0,
            viewport_height,
            content_height: 0,
            line_height: DEFAULT_LINE_HEIGHT,
            bottom_threshold: DEFAULT_BOTTOM_THRESHOLD,
        }
    }

    pub fn with_line_height(mut self, line_height: u32) -> Self {
        self.line_height = line_height.max(1);
        self
    }

    pub fn with_bottom_threshold(mut self, threshold: u32) -> Self {
        self.bottom_threshold = threshold;
        self
    }

    pub fn max_scroll(&self) -> u32 {
        self.content_height.saturating_sub(self.viewport_height)
    }

    /// Measured from the current geometry, not the cached flag
    pub fn at_bottom(&self) -> bool {
        self.max_scroll().saturating_sub(self.scroll_top) <= self.bottom_threshold
    }

    pub fn scrolled_to_bottom(mut self) -> Self {
        self.scroll_top = self.max_scroll();
        self.is_at_bottom = true;
        self
    }

    /// Apply a user scroll, clamped to the scrollable range
    pub fn scrolled_to(mut self, scroll_top: u32) -> Self {
        self.scroll_top = scroll_top.min(self.max_scroll());
        self.is_at_bottom = self.at_bottom();
        self
    }

    pub fn resized(mut self, viewport_height: u32) -> Self {
        self.viewport_height = viewport_height;
        self.scroll_top = self.scroll_top.min(self.max_scroll());
        self.is_at_bottom = self.at_bottom();
        self
    }

    /// Index range of entries visible in the viewport
    pub fn visible_range(&self, len: usize) -> std::ops::Range<usize> {
        let line = self.line_height.max(1) as usize;
        let first = (self.scroll_top as usize / line).min(len);
        let rows = (self.viewport_height as usize).div_ceil(line);
        first..(first + rows).min(len)
    }
}

/// Render a fetched tail.
///
/// The list is replaced wholesale. The view follows to the bottom only when
/// auto-scroll is on and either the user was already at the bottom or the
/// fetch was user-triggered (`silent == false`); otherwise the scroll
/// position is kept.
pub fn render(entries: &[Value], view: ViewState, silent: bool) -> (RenderedLog, ViewState) {
    let was_at_bottom = view.at_bottom();
    let rendered = RenderedLog::from_values(entries);

    let mut next = view;
    next.content_height = (rendered.len() as u32).saturating_mul(view.line_height);

    if view.auto_scroll_enabled && (was_at_bottom || !silent) {
        next = next.scrolled_to_bottom();
    } else {
        next.scroll_top = view.scroll_top.min(next.max_scroll());
        next.is_at_bottom = next.at_bottom();
    }

    (rendered, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| {
                json!({
                    "timestamp": "2024-05-01 10:00:00.000",
                    "level": "INFO",
                    "message": format!("entry {i}"),
                    "data": {}
                })
            })
            .collect()
    }

    /// 100-unit viewport, 20-unit lines: 5 visible rows
    fn view() -> ViewState {
        ViewState::new(100)
    }

    #[test]
    fn test_follows_when_at_bottom() {
        let (_, v) = render(&entries(10), view(), true);
        assert_eq!(v.content_height, 200);
        assert_eq!(v.scroll_top, 100);
        assert!(v.is_at_bottom);

        let (_, v) = render(&entries(30), v, true);
        assert_eq!(v.scroll_top, 500);
    }

    #[test]
    fn test_silent_poll_keeps_scrolled_up_position() {
        let (_, v) = render(&entries(30), view(), true);
        let v = v.scrolled_to(40);
        assert!(!v.is_at_bottom);

        let (rendered, v) = render(&entries(40), v, true);
        assert_eq!(rendered.len(), 40);
        assert_eq!(v.scroll_top, 40);
        assert!(!v.is_at_bottom);
    }

    #[test]
    fn test_within_threshold_counts_as_bottom() {
        let (_, v) = render(&entries(30), view(), true);
        // max scroll is 500; 460 is 40 units away
        let v = v.scrolled_to(460);
        assert!(v.at_bottom());

        let (_, v) = render(&entries(35), v, true);
        assert_eq!(v.scroll_top, 600);
    }

    #[test]
    fn test_user_triggered_fetch_scrolls_even_when_scrolled_up() {
        let (_, v) = render(&entries(30), view(), true);
        let v = v.scrolled_to(0);

        let (_, v) = render(&entries(31), v, false);
        assert_eq!(v.scroll_top, 520);
        assert!(v.is_at_bottom);
    }

    #[test]
    fn test_auto_scroll_off_never_moves() {
        let mut v = view();
        v.auto_scroll_enabled = false;

        let (_, v) = render(&entries(30), v, false);
        assert_eq!(v.scroll_top, 0);

        let v = v.scrolled_to(500);
        let (_, v) = render(&entries(40), v, true);
        assert_eq!(v.scroll_top, 500);
        assert!(!v.is_at_bottom);
    }

    #[test]
    fn test_shrinking_content_clamps_scroll() {
        let (_, v) = render(&entries(30), view(), true);
        let v = v.scrolled_to(100);
        let (rendered, v) = render(&[], v, true);
        assert!(rendered.is_empty());
        assert_eq!(v.scroll_top, 0);
        assert!(v.is_at_bottom);
    }

    #[test]
    fn test_lenient_decoding_uses_placeholders() {
        let values = vec![
            json!({}),
            json!({"level": "WARNING", "message": 42}),
            json!({"timestamp": "", "level": "TRACE", "message": null, "data": {"k": 1}}),
            json!("not an object"),
        ];
        let rendered = RenderedLog::from_values(&values);
        assert_eq!(rendered.len(), 4);

        let first = &rendered.entries[0];
        assert_eq!(first.timestamp, MISSING_TIMESTAMP);
        assert_eq!(first.level, DisplayLevel::Known(LogLevel::Info));
        assert_eq!(first.message, "");
        assert_eq!(first.data, None);

        assert_eq!(rendered.entries[1].level, DisplayLevel::Known(LogLevel::Warn));
        assert_eq!(rendered.entries[1].message, "42");

        let third = &rendered.entries[2];
        assert_eq!(third.timestamp, MISSING_TIMESTAMP);
        assert_eq!(third.level.label(), "TRACE");
        assert_eq!(third.data.as_deref(), Some(r#"{"k":1}"#));

        assert_eq!(rendered.entries[3].message, "");
    }

    #[test]
    fn test_render_keeps_response_order() {
        let (rendered, _) = render(&entries(3), view(), true);
        let messages: Vec<_> = rendered.entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["entry 0", "entry 1", "entry 2"]);
        assert_eq!(
            rendered.entries[0].line(),
            "[2024-05-01 10:00:00.000] INFO entry 0"
        );
    }

    #[test]
    fn test_visible_range() {
        let (_, v) = render(&entries(30), view(), true);
        assert_eq!(v.visible_range(30), 25..30);
        let v = v.scrolled_to(0);
        assert_eq!(v.visible_range(30), 0..5);
        assert_eq!(ViewState::new(100).visible_range(2), 0..2);
    }
}
