//! Task templates
//!
//! A template names a user function and fixes how many parameters and
//! dependencies its tasks take. Any number of tasks may be created from the
//! same template.

use std::fmt;
use std::sync::Arc;

use crate::runtime::guid::Guid;
use crate::runtime::policy::TaskCall;

/// User function run by a task. The returned handle is the task's result.
pub type TaskFn = dyn Fn(&mut TaskCall<'_>) -> Guid + Send + Sync;

pub struct TaskTemplate {
    name: String,
    paramc: usize,
    depc: usize,
    func: Arc<TaskFn>,
}

impl TaskTemplate {
    pub fn new<F>(
        name: impl Into<String>,
        paramc: usize,
        depc: usize,
        func: F,
    ) -> Self
    where
        F: Fn(&mut TaskCall<'_>) -> Guid + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            paramc,
            depc,
            func: Arc::new(func),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn paramc(&self) -> usize {
        self.paramc
    }

    #[inline]
    pub fn depc(&self) -> usize {
        self.depc
    }

    #[inline]
    pub(crate) fn invoke(
        &self,
        call: &mut TaskCall<'_>,
    ) -> Guid {
        (self.func)(call)
    }
}

impl fmt::Debug for TaskTemplate {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("TaskTemplate")
            .field("name", &self.name)
            .field("paramc", &self.paramc)
            .field("depc", &self.depc)
            .finish()
    }
}
