pub mod acquisition;
pub mod costs;
pub mod display;
pub mod events;
pub mod history;
pub mod mesh;
pub mod render;
pub mod sync;

pub use acquisition::{AcquisitionMode, MeshTransport, NullTransport};
pub use display::{DisplayConfig, DisplayError, MeshDisplay};
pub use events::DisplayEvent;
pub use mesh::{MeshId, MeshSnapshot};
pub use render::{NullRendererSink, RendererSink};
