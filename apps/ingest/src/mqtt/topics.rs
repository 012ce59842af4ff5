//! Topic layout for the band fleet
//!
//! All topics hang off a configurable root so staging and production
//! fleets can share a broker. Classification is suffix based; the root
//! itself never carries routing information.

/// Inbound route a topic resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Periodic full telemetry frame
    TelemetrySync,
    /// Discrete event (SOS, fall, vital threshold crossing)
    AsyncEvent,
    /// GPS position string
    GpsLocation,
    /// Out-of-band weather request
    WeatherRequest,
    /// Stimulator came online
    StimConnect,
    /// Stimulator dropped off
    StimDisconnect,
    /// Stimulator progress report
    StimStatus,
    /// Stimulator finished its program
    StimComplete,
    /// Stimulator fault report
    StimError,
}

/// Builds and classifies topics under a fleet root
#[derive(Debug, Clone)]
pub struct TopicMap {
    root: String,
}

impl TopicMap {
    pub fn new(root: impl Into<String>) -> Self {
        let mut root = root.into();
        while root.ends_with('/') {
            root.pop();
        }
        Self { root }
    }

    /// All topics the ingest service subscribes to
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            self.telemetry_sync(),
            self.telemetry_async(),
            self.gps_location(),
            self.weather_get(),
            format!("{}/NerveStim/Connect", self.root),
            format!("{}/NerveStim/Disconnect", self.root),
            format!("{}/NerveStim/Status", self.root),
            format!("{}/NerveStim/Complete", self.root),
            format!("{}/NerveStim/Error", self.root),
        ]
    }

    pub fn telemetry_sync(&self) -> String {
        format!("{}/naas/post/sync", self.root)
    }

    pub fn telemetry_async(&self) -> String {
        format!("{}/naas/post/async", self.root)
    }

    pub fn gps_location(&self) -> String {
        format!("{}/naas/GPS/Location", self.root)
    }

    pub fn weather_get(&self) -> String {
        format!("{}/naas/WEATHER/GET", self.root)
    }

    /// Weather conditions pushed back to the fleet
    pub fn weather_status(&self) -> String {
        format!("{}/naas/WEATHER/STATUS", self.root)
    }

    pub fn stim_start(&self) -> String {
        format!("{}/NerveStim/Start", self.root)
    }

    pub fn stim_stop(&self) -> String {
        format!("{}/NerveStim/Stop", self.root)
    }

    pub fn stim_change_level(&self) -> String {
        format!("{}/NerveStim/ChangeLevel", self.root)
    }

    /// Resolve an inbound topic to its route, if any
    pub fn classify(&self, topic: &str) -> Option<Route> {
        if !topic.starts_with(self.root.as_str()) {
            return None;
        }
        let suffix = &topic[self.root.len()..];
        match suffix {
            "/naas/post/sync" => Some(Route::TelemetrySync),
            "/naas/post/async" => Some(Route::AsyncEvent),
            "/naas/GPS/Location" => Some(Route::GpsLocation),
            "/naas/WEATHER/GET" => Some(Route::WeatherRequest),
            "/NerveStim/Connect" => Some(Route::StimConnect),
            "/NerveStim/Disconnect" => Some(Route::StimDisconnect),
            "/NerveStim/Status" => Some(Route::StimStatus),
            "/NerveStim/Complete" => Some(Route::StimComplete),
            "/NerveStim/Error" => Some(Route::StimError),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_topics() {
        let map = TopicMap::new("/DT/eHG4");
        assert_eq!(
            map.classify("/DT/eHG4/naas/post/sync"),
            Some(Route::TelemetrySync)
        );
        assert_eq!(
            map.classify("/DT/eHG4/naas/post/async"),
            Some(Route::AsyncEvent)
        );
        assert_eq!(
            map.classify("/DT/eHG4/naas/GPS/Location"),
            Some(Route::GpsLocation)
        );
        assert_eq!(
            map.classify("/DT/eHG4/NerveStim/Complete"),
            Some(Route::StimComplete)
        );
    }

    #[test]
    fn test_classify_rejects_foreign_topics() {
        let map = TopicMap::new("/DT/eHG4");
        assert_eq!(map.classify("/DT/other/naas/post/sync"), None);
        assert_eq!(map.classify("/DT/eHG4/naas/post/unknown"), None);
        assert_eq!(map.classify(""), None);
    }

    #[test]
    fn test_trailing_slash_root() {
        let map = TopicMap::new("/DT/eHG4/");
        assert_eq!(map.telemetry_sync(), "/DT/eHG4/naas/post/sync");
        assert_eq!(
            map.classify("/DT/eHG4/naas/post/sync"),
            Some(Route::TelemetrySync)
        );
    }

    #[test]
    fn test_subscriptions_cover_all_routes() {
        let map = TopicMap::new("/DT/eHG4");
        for topic in map.subscriptions() {
            assert!(map.classify(&topic).is_some(), "unroutable: {}", topic);
        }
    }
}
