use serde::{Deserialize, Serialize};

/// Commands the settings UI sends to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ContentMessage {
    EnableSelector,
    DisableSelector,
    /// Stored selectors changed (deleted/cleared); rebuild controls from the store
    RefreshSelectors,
    /// Legacy popup badge query
    GetCount,
}

/// Notifications the page sends back to the settings UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum UiMessage {
    /// Stored selectors changed; re-render the list
    RefreshPopup,
    /// Selector mode ended; reset the toggle
    UpdateToggleButton { active: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}
