//! The browser-side collaborator: tab/window queries, capture and events.

use std::future::Future;

use tabtime_core::{RecordTarget, SurfaceId, WindowId, urls};

use crate::error::HostError;

const UNTITLED: &str = "Untitled";

/// Load state of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Complete,
}

/// What the host knows about one surface (tab).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub id: SurfaceId,
    pub window_id: WindowId,
    pub url: Option<String>,
    pub title: Option<String>,
    pub icon: Option<String>,
    pub status: LoadStatus,
}

impl SurfaceInfo {
    /// Tracking metadata for this surface, or `None` if it is not trackable.
    pub fn record_target(&self) -> Option<RecordTarget> {
        let url = self.url.as_deref().filter(|url| urls::is_trackable_url(url))?;
        let domain = urls::extract_domain(url)?;
        Some(RecordTarget {
            surface_id: self.id,
            window_id: self.window_id,
            url: url.to_string(),
            domain,
            title: self
                .title
                .clone()
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            icon: self.icon.clone().filter(|icon| !icon.is_empty()),
        })
    }
}

/// The parts of a surface update the tracker looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeHint {
    pub url: Option<String>,
    pub status: Option<LoadStatus>,
}

impl ChangeHint {
    /// Navigations and load completions matter; favicon or title churn doesn't.
    pub fn is_relevant(&self) -> bool {
        self.url.is_some() || self.status == Some(LoadStatus::Complete)
    }
}

/// Events delivered by the host, possibly redundant or out of order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Activated(SurfaceId),
    Updated(SurfaceId, ChangeHint),
    Removed(SurfaceId),
    /// `None` when every browser window lost focus.
    WindowFocusChanged(Option<WindowId>),
}

/// Query and capture interface of the host environment.
pub trait Host: Send + Sync + 'static {
    /// Metadata of one surface.
    fn surface(&self, id: SurfaceId) -> impl Future<Output = Result<SurfaceInfo, HostError>> + Send;

    /// Active surface of `window`, or of the current window when `None`.
    fn active_surface(
        &self,
        window: Option<WindowId>,
    ) -> impl Future<Output = Result<Option<SurfaceInfo>, HostError>> + Send;

    /// Captures the visible surface of `window` as a data URL.
    fn capture_visible(
        &self,
        window: WindowId,
    ) -> impl Future<Output = Result<Option<String>, HostError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(url: Option<&str>, title: Option<&str>) -> SurfaceInfo {
        SurfaceInfo {
            id: SurfaceId(3),
            window_id: WindowId(1),
            url: url.map(str::to_string),
            title: title.map(str::to_string),
            icon: Some(String::new()),
            status: LoadStatus::Complete,
        }
    }

    #[test]
    fn target_falls_back_to_untitled() {
        let target = surface(Some("https://news.ycombinator.com/item?id=1"), None)
            .record_target()
            .unwrap();
        assert_eq!(target.domain, "news.ycombinator.com");
        assert_eq!(target.title, "Untitled");
        assert_eq!(target.icon, None);
    }

    #[test]
    fn internal_pages_have_no_target() {
        assert!(surface(Some("chrome://newtab/"), Some("New Tab")).record_target().is_none());
        assert!(surface(Some("about:blank"), None).record_target().is_none());
        assert!(surface(None, None).record_target().is_none());
    }

    #[test]
    fn only_navigation_and_completion_are_relevant() {
        assert!(!ChangeHint::default().is_relevant());
        assert!(
            !ChangeHint {
                url: None,
                status: Some(LoadStatus::Loading)
            }
            .is_relevant()
        );
        assert!(
            ChangeHint {
                url: None,
                status: Some(LoadStatus::Complete)
            }
            .is_relevant()
        );
        assert!(
            ChangeHint {
                url: Some("https://x.com/".into()),
                status: None
            }
            .is_relevant()
        );
    }
}
