use tokio::sync::oneshot;

use super::NotificationFilter;
use crate::batch::ChunkedOutcome;
use crate::error::{BackendError, BatchError, NotificationError};
use crate::notifications::{FanoutPayload, FanoutReport, NotificationRecord};
use crate::source::Subscription;

pub(crate) type Reply<T, E = NotificationError> = oneshot::Sender<Result<T, E>>;

/// Command sent to the store actor.
pub(crate) enum StoreCommand {
    Start {
        response: Reply<()>,
    },
    Stop {
        response: Reply<()>,
    },
    Refresh {
        response: Reply<()>,
    },
    MarkRead {
        id: String,
        response: Reply<()>,
    },
    MarkAllRead {
        response: Reply<usize, BatchError>,
    },
    Delete {
        id: String,
        response: Reply<()>,
    },
    DeleteAllRead {
        response: Reply<usize, BatchError>,
    },
    SendFanout {
        targets: Vec<String>,
        payload: FanoutPayload,
        response: Reply<FanoutReport, BatchError>,
    },
    SetFilter {
        filter: NotificationFilter,
        response: Reply<()>,
    },
}

/// Backend work finished by a task the actor spawned.
pub(crate) enum Completion {
    Opened {
        generation: u64,
        result: Result<Subscription, BackendError>,
    },
    Refreshed {
        result: Result<Vec<NotificationRecord>, BackendError>,
        response: Reply<()>,
    },
    MarkedRead {
        result: Result<(), BackendError>,
        response: Reply<()>,
    },
    MarkedAllRead {
        ids: Vec<String>,
        outcome: ChunkedOutcome,
        response: Reply<usize, BatchError>,
    },
    Deleted {
        id: String,
        result: Result<(), BackendError>,
        response: Reply<()>,
    },
    DeletedAllRead {
        ids: Vec<String>,
        outcome: ChunkedOutcome,
        response: Reply<usize, BatchError>,
    },
    FanoutSent {
        report: FanoutReport,
        outcome: ChunkedOutcome,
        response: Reply<FanoutReport, BatchError>,
    },
}
