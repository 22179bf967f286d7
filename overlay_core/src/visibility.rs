/// Opacity while the pointer rests on a locked overlay, so whatever is
/// underneath shows through without unlocking.
pub const LOCKED_HOVER_OPACITY: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisibilityInput {
    pub is_playing: bool,
    pub hide_when_paused: bool,
    pub has_track: bool,
    pub is_hovering: bool,
    pub is_locked: bool,
}

/// Target opacity in `[0, 1]`. Animating towards it is the renderer's job.
pub fn target_opacity(input: VisibilityInput) -> f64 {
    if input.hide_when_paused && input.has_track && !input.is_playing {
        0.0
    } else if input.is_hovering && input.is_locked {
        LOCKED_HOVER_OPACITY
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_when_paused_regardless_of_pointer() {
        for is_hovering in [false, true] {
            for is_locked in [false, true] {
                let input = VisibilityInput {
                    is_playing: false,
                    hide_when_paused: true,
                    has_track: true,
                    is_hovering,
                    is_locked,
                };
                assert_eq!(target_opacity(input), 0.0);
            }
        }
    }

    #[test]
    fn paused_without_track_is_not_hidden() {
        let input = VisibilityInput {
            hide_when_paused: true,
            ..Default::default()
        };
        assert_eq!(target_opacity(input), 1.0);
    }

    #[test]
    fn paused_with_option_off_stays_visible() {
        let input = VisibilityInput {
            has_track: true,
            ..Default::default()
        };
        assert_eq!(target_opacity(input), 1.0);
    }

    #[test]
    fn hovering_locked_overlay_dims_it() {
        let input = VisibilityInput {
            is_playing: true,
            has_track: true,
            is_hovering: true,
            is_locked: true,
            ..Default::default()
        };
        assert_eq!(target_opacity(input), LOCKED_HOVER_OPACITY);

        let unlocked = VisibilityInput {
            is_locked: false,
            ..input
        };
        assert_eq!(target_opacity(unlocked), 1.0);
    }
}
