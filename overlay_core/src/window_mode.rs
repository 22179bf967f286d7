use serde::Serialize;

/// Which surface a window renders. Read once from the start URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowMode {
    Overlay,
    Settings,
}

impl WindowMode {
    pub const QUERY_PARAM: &'static str = "settings";

    /// `index.html?settings=true` selects the settings surface; anything else
    /// is the overlay.
    pub fn from_start_url(url: &str) -> Self {
        let query = match url.split_once('?') {
            Some((_, rest)) => rest.split('#').next().unwrap_or_default(),
            None => return WindowMode::Overlay,
        };

        let settings = query
            .split('&')
            .filter_map(|pair| pair.split_once('=').or(Some((pair, ""))))
            .filter(|(name, _)| decode(name) == Self::QUERY_PARAM)
            .any(|(_, value)| decode(value).eq_ignore_ascii_case("true"));

        if settings {
            WindowMode::Settings
        } else {
            WindowMode::Overlay
        }
    }

    /// Start URL for a window in this mode, relative to the app's asset root.
    pub fn start_url(self) -> String {
        match self {
            WindowMode::Overlay => "index.html".to_string(),
            WindowMode::Settings => format!("index.html?{}=true", Self::QUERY_PARAM),
        }
    }

    pub fn is_settings(self) -> bool {
        self == WindowMode::Settings
    }
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_settings_window() {
        assert_eq!(
            WindowMode::from_start_url("tauri://localhost/index.html?settings=true"),
            WindowMode::Settings
        );
        assert_eq!(
            WindowMode::from_start_url("http://localhost:1420/?lang=en&settings=TRUE#top"),
            WindowMode::Settings
        );
    }

    #[test]
    fn everything_else_is_the_overlay() {
        assert_eq!(WindowMode::from_start_url("index.html"), WindowMode::Overlay);
        assert_eq!(
            WindowMode::from_start_url("index.html?settings=false"),
            WindowMode::Overlay
        );
        assert_eq!(
            WindowMode::from_start_url("index.html?settings"),
            WindowMode::Overlay
        );
        assert_eq!(
            WindowMode::from_start_url("index.html?xsettings=true"),
            WindowMode::Overlay
        );
    }

    #[test]
    fn start_url_round_trips() {
        for mode in [WindowMode::Overlay, WindowMode::Settings] {
            assert_eq!(WindowMode::from_start_url(&mode.start_url()), mode);
        }
    }
}
