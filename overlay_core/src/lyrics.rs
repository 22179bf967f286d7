use crate::types::LyricLine;
use log::{debug, warn};
use serde::Serialize;

/// Lyric lines ordered by non-decreasing start time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LyricSet {
    lines: Vec<LyricLine>,
    synced: bool,
}

impl LyricSet {
    /// Lines are stable-sorted by start time, so lines sharing a start time
    /// keep the order they arrived in. Lines without a finite start time are
    /// dropped.
    pub fn new(lines: Vec<LyricLine>, synced: bool) -> Self {
        let total = lines.len();
        let mut lines: Vec<LyricLine> = lines
            .into_iter()
            .filter(|line| line.start_time.is_finite())
            .collect();
        if lines.len() != total {
            warn!(
                "Dropped {} lyric lines without a usable start time",
                total - lines.len()
            );
        }
        lines.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        debug!("Lyric set loaded: {} lines (synced: {})", lines.len(), synced);
        Self { lines, synced }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// True when there is nothing to display. Unsynced sets count as empty.
    pub fn is_empty(&self) -> bool {
        !self.synced || self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    /// The active line plus up to `prev` lines before and `next` lines after it.
    /// Returns the index of the first returned line alongside the slice.
    pub fn context(&self, active: usize, prev: usize, next: usize) -> (usize, &[LyricLine]) {
        if active >= self.lines.len() {
            return (active, &[]);
        }
        let start = active.saturating_sub(prev);
        let end = active.saturating_add(next).saturating_add(1).min(self.lines.len());
        (start, &self.lines[start..end])
    }
}

/// Index of the line whose start time is the greatest value `<= position`.
///
/// Lines sharing a start time resolve to the last one in sequence order.
/// `end_time` is advisory and never deactivates a line.
pub fn active_line(set: &LyricSet, position: f64) -> Option<usize> {
    if set.is_empty() {
        return None;
    }
    let reached = set.lines.partition_point(|line| line.start_time <= position);
    reached.checked_sub(1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayText {
    pub main: String,
    pub phonetic: Option<String>,
    pub translation: Option<String>,
}

impl DisplayText {
    pub fn from_line(line: &LyricLine) -> Self {
        Self {
            main: line.text.clone(),
            phonetic: distinct_from(&line.text, line.pron_text.as_deref()),
            translation: distinct_from(&line.text, line.trans_text.as_deref()),
        }
    }
}

// Secondary text equal to the main text would just repeat the line.
fn distinct_from(main: &str, extra: Option<&str>) -> Option<String> {
    extra
        .map(str::trim)
        .filter(|text| !text.is_empty() && *text != main.trim())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(start: f64, text: &str) -> LyricLine {
        LyricLine {
            start_time: start,
            end_time: None,
            text: text.to_string(),
            pron_text: None,
            trans_text: None,
        }
    }

    fn set(starts: &[f64]) -> LyricSet {
        let lines = starts
            .iter()
            .enumerate()
            .map(|(i, s)| line(*s, &format!("line {}", i)))
            .collect();
        LyricSet::new(lines, true)
    }

    #[test]
    fn resolves_boundaries() {
        let lyrics = set(&[0.0, 5.0, 10.0]);
        assert_eq!(active_line(&lyrics, 7.0), Some(1));
        assert_eq!(active_line(&lyrics, 10.0), Some(2));
        assert_eq!(active_line(&lyrics, 5.0), Some(1));
        assert_eq!(active_line(&lyrics, 0.0), Some(0));
        assert_eq!(active_line(&lyrics, -1.0), None);
    }

    #[test]
    fn past_the_last_line_keeps_it_active_despite_end_time() {
        let mut lines = vec![line(0.0, "a"), line(5.0, "b")];
        lines[1].end_time = Some(6.0);
        let lyrics = LyricSet::new(lines, true);
        assert_eq!(active_line(&lyrics, 500.0), Some(1));
    }

    #[test]
    fn simultaneous_lines_resolve_to_the_later_one() {
        let lyrics = LyricSet::new(
            vec![line(0.0, "intro"), line(5.0, "first"), line(5.0, "second")],
            true,
        );
        assert_eq!(active_line(&lyrics, 5.0), Some(2));
        assert_eq!(active_line(&lyrics, 6.5), Some(2));
        assert_eq!(lyrics.line(2).unwrap().text, "second");
    }

    #[test]
    fn matches_linear_scan_for_every_position() {
        let lyrics = set(&[1.0, 1.0, 2.5, 4.0, 4.0, 4.0, 9.75]);
        let mut position = -2.0;
        while position < 12.0 {
            let expected = lyrics
                .lines()
                .iter()
                .rposition(|l| l.start_time <= position);
            assert_eq!(active_line(&lyrics, position), expected, "at {}", position);
            position += 0.25;
        }
    }

    #[test]
    fn empty_and_unsynced_sets_have_no_active_line() {
        assert_eq!(active_line(&LyricSet::empty(), 3.0), None);

        let unsynced = LyricSet::new(vec![line(0.0, "plain"), line(0.0, "text")], false);
        assert!(unsynced.is_empty());
        assert_eq!(active_line(&unsynced, 3.0), None);
    }

    #[test]
    fn out_of_order_input_is_sorted_stably() {
        let lyrics = LyricSet::new(
            vec![line(10.0, "c"), line(0.0, "a"), line(5.0, "b1"), line(5.0, "b2")],
            true,
        );
        let texts: Vec<&str> = lyrics.lines().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b1", "b2", "c"]);
    }

    #[test]
    fn non_finite_start_times_are_dropped() {
        let lyrics = LyricSet::new(vec![line(f64::NAN, "bad"), line(1.0, "good")], true);
        assert_eq!(lyrics.lines().len(), 1);
        assert_eq!(active_line(&lyrics, f64::NAN), None);
    }

    #[test]
    fn context_clamps_to_bounds() {
        let lyrics = set(&[0.0, 1.0, 2.0, 3.0, 4.0]);

        let (start, lines) = lyrics.context(0, 2, 1);
        assert_eq!(start, 0);
        assert_eq!(lines.len(), 2);

        let (start, lines) = lyrics.context(3, 1, 5);
        assert_eq!(start, 2);
        assert_eq!(lines.len(), 3);

        let (_, lines) = lyrics.context(9, 1, 1);
        assert!(lines.is_empty());
    }

    #[test]
    fn display_text_hides_duplicate_secondary_text() {
        let mut l = line(0.0, "Hello");
        l.pron_text = Some("Hello".to_string());
        l.trans_text = Some("Bonjour".to_string());

        let display = DisplayText::from_line(&l);
        assert_eq!(display.main, "Hello");
        assert_eq!(display.phonetic, None);
        assert_eq!(display.translation.as_deref(), Some("Bonjour"));

        l.trans_text = Some("   ".to_string());
        assert_eq!(DisplayText::from_line(&l).translation, None);
    }
}
