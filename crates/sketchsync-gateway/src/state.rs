//! Gateway shared state.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use sketchsync_canvas::{
    Color, DrawSurface, FsSnapshotStore, NullSnapshotStore, RasterSurface, SnapshotStore,
};
use sketchsync_core::config::Config;

use crate::sync::SyncController;

/// Shared state accessible from all connections and HTTP handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub sync: Arc<SyncController>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

impl GatewayState {
    /// Build the canvas and snapshot store described by `config`.
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let canvas = config.canvas();
        let background = canvas
            .background
            .parse::<Color>()
            .with_context(|| format!("canvas.background {:?}", canvas.background))?;
        let surface = RasterSurface::new(canvas.width, canvas.height, background);

        let snapshots: Arc<dyn SnapshotStore> = if config.snapshots_enabled() {
            let dir = config.snapshot_dir();
            info!(dir = %dir.display(), "Persisting snapshots");
            Arc::new(FsSnapshotStore::new(dir))
        } else {
            Arc::new(NullSnapshotStore)
        };

        Ok(Self::with_parts(config, Box::new(surface), snapshots))
    }

    /// Assemble state from explicit collaborators.
    pub fn with_parts(
        config: Arc<Config>,
        surface: Box<dyn DrawSurface>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            config,
            sync: Arc::new(SyncController::new(surface, snapshots.clone())),
            snapshots,
        }
    }
}

#[cfg(test)]
mod tests {
    use sketchsync_core::config::{CanvasConfig, SnapshotConfig};

    use super::*;

    #[test]
    fn test_state_from_config() {
        let config = Config {
            canvas: Some(CanvasConfig {
                width: 32,
                height: 16,
                background: "#123456".into(),
            }),
            snapshots: Some(SnapshotConfig {
                enabled: false,
                dir: None,
            }),
            ..Default::default()
        };
        let state = GatewayState::new(Arc::new(config)).unwrap();
        assert_eq!(state.sync.canvas_size(), (32, 16));
        assert_eq!(state.sync.session_count(), 0);
    }

    #[test]
    fn test_bad_background_is_rejected() {
        let config = Config {
            canvas: Some(CanvasConfig {
                width: 8,
                height: 8,
                background: "sparkly".into(),
            }),
            ..Default::default()
        };
        let err = GatewayState::new(Arc::new(config)).err().unwrap();
        assert!(err.to_string().contains("canvas.background"));
    }
}
