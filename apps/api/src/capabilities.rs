/// What this build/deployment can do. The resolver and the model manager
/// depend on these flags rather than on a named platform.
pub trait Capabilities: Send + Sync {
    /// The model directory is usable for reading and writing artifacts.
    fn has_filesystem(&self) -> bool;

    /// A local inference runtime is configured.
    fn has_inference_runtime(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticCapabilities {
    pub filesystem: bool,
    pub inference_runtime: bool,
}

impl StaticCapabilities {
    pub fn new(filesystem: bool, inference_runtime: bool) -> Self {
        Self {
            filesystem,
            inference_runtime,
        }
    }

    /// Rule-based chat only: no model storage, no inference.
    pub fn headless() -> Self {
        Self::new(false, false)
    }
}

impl Capabilities for StaticCapabilities {
    fn has_filesystem(&self) -> bool {
        self.filesystem
    }

    fn has_inference_runtime(&self) -> bool {
        self.inference_runtime
    }
}
