//! Synchronous command channel.
//!
//! A blocking query travels as a [`RenderJob`]: the batch queued so far, an
//! optional command to run after it, and a one-shot reply sender. The
//! control plane waits on the receiving half. A job that is never run is
//! dropped, which drops its sender, so the waiter observes abandonment
//! instead of hanging.

use crossbeam_channel::{Receiver, Sender};
use glq_protocol::command::CommandRecord;
use glq_protocol::error::ErrorFlags;
use glq_protocol::handle::SurfaceSize;
use glq_protocol::value::SyncValue;
use tracing::trace;

use crate::error::ScheduleError;
use crate::queue::TransferBatch;

/// The result of a completed job.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReply {
    pub value: Option<SyncValue>,
    /// Sticky error bits accumulated on the execution plane up to and
    /// including the command, handed over to the control plane.
    pub errors: ErrorFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(SyncReply),
    /// The execution plane dropped the job without running it.
    Abandoned,
}

pub struct RenderJob {
    pub batch: TransferBatch,
    pub command: Option<CommandRecord>,
    reply: Sender<SyncReply>,
}

impl RenderJob {
    pub fn new(batch: TransferBatch, command: Option<CommandRecord>) -> (Self, Receiver<SyncReply>) {
        let (reply, receiver) = crossbeam_channel::bounded(1);
        (
            Self {
                batch,
                command,
                reply,
            },
            receiver,
        )
    }

    /// Split into batch, command and the reply half.
    pub fn into_parts(self) -> (TransferBatch, Option<CommandRecord>, JobReply) {
        (self.batch, self.command, JobReply(self.reply))
    }
}

/// Reply half of a job, kept while the command runs.
pub struct JobReply(Sender<SyncReply>);

impl JobReply {
    pub fn send(self, reply: SyncReply) {
        if self.0.send(reply).is_err() {
            trace!("sync reply receiver dropped");
        }
    }
}

/// Wait for a job's reply. `inline` schedulers have already run the job by
/// the time this is called, so nothing is waited on.
pub fn wait(receiver: &Receiver<SyncReply>, inline: bool) -> SyncOutcome {
    let received = if inline {
        receiver.try_recv().ok()
    } else {
        receiver.recv().ok()
    };
    match received {
        Some(reply) => SyncOutcome::Completed(reply),
        None => SyncOutcome::Abandoned,
    }
}

/// How the control plane hands work to the execution plane.
pub trait RenderScheduler {
    /// Hand over one frame's commands. Never blocks on rendering, though a
    /// bounded scheduler may block while too many frames are in flight.
    fn submit_frame(&self, batch: TransferBatch);

    /// Run a job. On error the job has been dropped.
    fn schedule_job(&self, job: RenderJob) -> Result<(), ScheduleError>;

    /// True when `schedule_job` runs the job before returning.
    fn runs_inline(&self) -> bool;

    /// Create (or recreate) the execution-plane context and surfaces.
    fn initialize(&self, size: SurfaceSize);

    /// Resize the surfaces of a live execution plane. Runs after every
    /// frame and job submitted before it.
    fn resize(&self, size: SurfaceSize);

    /// Tear down the execution-plane context. Returns once teardown is done.
    fn invalidate(&self);
}
