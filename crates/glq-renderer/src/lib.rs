pub mod context;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod execute;
pub mod frame;
pub mod headless;
pub mod host;
pub mod inline;
pub mod lifecycle;
pub mod notify;
pub mod queue;
pub mod render_thread;
pub mod renderer;
pub mod stats;
pub mod sync;

pub use context::{Context, Resource, Value};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use driver::{Driver, DriverError, SurfaceDesc};
pub use error::{ContextError, RendererError, ScheduleError};
pub use headless::{DriverCall, HeadlessDriver, Probe};
pub use host::HostTextureProvider;
pub use inline::InlineScheduler;
pub use lifecycle::LifecycleState;
pub use notify::Notification;
pub use queue::{CommandQueue, QueueFullListener, TransferBatch};
pub use render_thread::RenderThread;
pub use renderer::Renderer;
pub use stats::{RendererStats, StatsSnapshot};
pub use sync::{RenderJob, RenderScheduler, SyncOutcome, SyncReply};
