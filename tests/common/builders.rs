//! Test data builders for creating simulated detectors

use portvis_rs::source::MockPortSource;
use portvis_rs::PortKind;

/// Builder for a [`MockPortSource`] populated port by port
///
/// Plugins may name an upstream that is added later (or never).
#[derive(Default)]
pub struct DetectorBuilder {
    ports: Vec<(String, PortKind, Option<String>)>,
    unsubscribable: Vec<String>,
}

impl DetectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn camera(mut self, id: &str) -> Self {
        self.ports.push((id.to_string(), PortKind::Camera, None));
        self
    }

    pub fn plugin(mut self, id: &str, upstream: &str) -> Self {
        self.ports
            .push((id.to_string(), PortKind::Plugin, Some(upstream.to_string())));
        self
    }

    /// A plugin with no configured upstream
    pub fn orphan(mut self, id: &str) -> Self {
        self.ports.push((id.to_string(), PortKind::Plugin, None));
        self
    }

    /// Mark a plugin as refusing change notification
    pub fn without_notifications(mut self, id: &str) -> Self {
        self.unsubscribable.push(id.to_string());
        self
    }

    pub fn build(self) -> MockPortSource {
        let source = MockPortSource::new();
        for (id, kind, upstream) in &self.ports {
            match kind {
                PortKind::Camera => {
                    source.add_camera(id);
                }
                PortKind::Plugin => {
                    source.add_plugin(id, upstream.as_deref());
                }
            }
        }
        for id in &self.unsubscribable {
            source.set_subscribable(id, false);
        }
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portvis_rs::PortDataSource;

    #[test]
    fn test_detector_builder() {
        let source = DetectorBuilder::new()
            .camera("camA")
            .plugin("pluginA", "camA")
            .orphan("pluginB")
            .build();

        let ports = source.list_ports().unwrap();
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].kind, PortKind::Camera);
    }
}
