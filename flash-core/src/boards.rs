//! Catalog of known target boards.
//!
//! The catalog only feeds board pickers; any target string is accepted by
//! the session store and handed to the toolchain as-is.

use serde::{Deserialize, Serialize};

/// A selectable hardware target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardProfile {
    /// Identifier passed to the toolchain (e.g. `NUCLEO_F401RE`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Platform page.
    #[serde(default)]
    pub url: Option<String>,
}

impl BoardProfile {
    fn new(id: &str, name: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            url: Some(url.to_string()),
        }
    }
}

/// Built-in Nucleo boards.
pub fn default_boards() -> Vec<BoardProfile> {
    vec![
        BoardProfile::new(
            "NUCLEO_F401RE",
            "Nucleo F401RE",
            "https://os.mbed.com/platforms/ST-Nucleo-F401RE/",
        ),
        BoardProfile::new(
            "NUCLEO_F411RE",
            "Nucleo F411RE",
            "https://os.mbed.com/platforms/ST-Nucleo-F411RE/",
        ),
        BoardProfile::new(
            "NUCLEO_F446RE",
            "Nucleo F446RE",
            "https://os.mbed.com/platforms/ST-Nucleo-F446RE/",
        ),
        BoardProfile::new(
            "NUCLEO_L476RG",
            "Nucleo L476RG",
            "https://os.mbed.com/platforms/ST-Nucleo-L476RG/",
        ),
    ]
}

/// Find a board by identifier, ignoring ASCII case.
pub fn find<'a>(boards: &'a [BoardProfile], id: &str) -> Option<&'a BoardProfile> {
    boards.iter().find(|b| b.id.eq_ignore_ascii_case(id))
}
