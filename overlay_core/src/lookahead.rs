use crate::types::NextTrackInfo;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookahead<'a> {
    ShowCurrent,
    ShowNext(&'a NextTrackInfo),
}

/// Decide whether the upcoming track's metadata replaces the current one.
///
/// The next track is shown only while `0 < remaining <= threshold_secs`. A
/// missing or non-finite `remaining` means the source could not tell, and a
/// non-positive one means the track already rolled over, so any preview we
/// hold is stale.
pub fn select_lookahead<'a>(
    remaining: Option<f64>,
    threshold_secs: f64,
    enabled: bool,
    next: Option<&'a NextTrackInfo>,
) -> Lookahead<'a> {
    let Some(next) = next.filter(|_| enabled) else {
        return Lookahead::ShowCurrent;
    };
    match remaining {
        Some(remaining) if remaining.is_finite() && remaining > 0.0 && remaining <= threshold_secs => {
            Lookahead::ShowNext(next)
        }
        _ => Lookahead::ShowCurrent,
    }
}
