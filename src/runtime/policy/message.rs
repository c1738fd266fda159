//! Policy messages
//!
//! Every core operation can be expressed as a [`PolicyMsg`]: a header naming
//! the operation, the worker that sent it and the outcome, plus a payload
//! holding the arguments. Results are written back into the same payload.
//! Messages are plain serde data so a transport can ship them elsewhere.

use serde::{Deserialize, Serialize};

use crate::runtime::event::EventKind;
use crate::runtime::guid::Guid;
use crate::runtime::task::{TaskProps, TaskSpec};

/// Operation carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgKind {
    CreateEvent,
    DestroyEvent,
    Satisfy,
    AddDependence,
    CreateTask,
    CreateDataBlock,
    DestroyDataBlock,
    Take,
    Give,
    Shutdown,
}

/// Processing state of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgStatus {
    Pending,
    Done,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgHeader {
    pub kind: MsgKind,
    /// Worker that sent the message; filled in when processed.
    pub source: usize,
    pub status: MsgStatus,
}

/// Arguments and results of each operation. Fields documented as outputs
/// are written by the policy domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsgPayload {
    CreateEvent {
        kind: EventKind,
        /// Output.
        guid: Guid,
    },
    DestroyEvent {
        guid: Guid,
    },
    Satisfy {
        target: Guid,
        slot: u32,
        payload: Guid,
    },
    AddDependence {
        source: Guid,
        destination: Guid,
        slot: u32,
    },
    CreateTask {
        template: Guid,
        params: Vec<u64>,
        deps: Vec<Guid>,
        props: TaskProps,
        output_event: bool,
        /// Output.
        guid: Guid,
        /// Output.
        output: Option<Guid>,
    },
    CreateDataBlock {
        size: usize,
        /// Output.
        guid: Guid,
    },
    DestroyDataBlock {
        guid: Guid,
    },
    Take {
        count: usize,
        /// Output.
        tasks: Vec<Guid>,
    },
    Give {
        tasks: Vec<Guid>,
    },
    Shutdown,
}

impl MsgPayload {
    pub fn kind(&self) -> MsgKind {
        match self {
            MsgPayload::CreateEvent { .. } => MsgKind::CreateEvent,
            MsgPayload::DestroyEvent { .. } => MsgKind::DestroyEvent,
            MsgPayload::Satisfy { .. } => MsgKind::Satisfy,
            MsgPayload::AddDependence { .. } => MsgKind::AddDependence,
            MsgPayload::CreateTask { .. } => MsgKind::CreateTask,
            MsgPayload::CreateDataBlock { .. } => MsgKind::CreateDataBlock,
            MsgPayload::DestroyDataBlock { .. } => MsgKind::DestroyDataBlock,
            MsgPayload::Take { .. } => MsgKind::Take,
            MsgPayload::Give { .. } => MsgKind::Give,
            MsgPayload::Shutdown => MsgKind::Shutdown,
        }
    }
}

/// A request to the policy domain and, once processed, its response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyMsg {
    pub header: MsgHeader,
    pub payload: MsgPayload,
}

impl PolicyMsg {
    pub fn new(payload: MsgPayload) -> Self {
        Self {
            header: MsgHeader {
                kind: payload.kind(),
                source: 0,
                status: MsgStatus::Pending,
            },
            payload,
        }
    }

    pub fn create_event(kind: EventKind) -> Self {
        Self::new(MsgPayload::CreateEvent {
            kind,
            guid: Guid::NULL,
        })
    }

    pub fn satisfy(
        target: Guid,
        payload: Guid,
    ) -> Self {
        Self::new(MsgPayload::Satisfy {
            target,
            slot: 0,
            payload,
        })
    }

    pub fn create_task(spec: TaskSpec) -> Self {
        Self::new(MsgPayload::CreateTask {
            template: spec.template,
            params: spec.params,
            deps: spec.deps,
            props: spec.props,
            output_event: spec.output_event,
            guid: Guid::NULL,
            output: None,
        })
    }

    pub fn take(count: usize) -> Self {
        Self::new(MsgPayload::Take {
            count,
            tasks: Vec::new(),
        })
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.header.status == MsgStatus::Done
    }

    /// Handle written back by a create operation.
    pub fn created(&self) -> Option<Guid> {
        match &self.payload {
            MsgPayload::CreateEvent { guid, .. }
            | MsgPayload::CreateTask { guid, .. }
            | MsgPayload::CreateDataBlock { guid, .. } => (!guid.is_null()).then_some(*guid),
            _ => None,
        }
    }
}
