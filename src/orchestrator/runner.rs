use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tokio::sync::mpsc;

use super::panel::{StepAction, TaskContext};

const MAILBOX_CAPACITY: usize = 32;

/// Receiving end of the runner's event channel.
pub type Mailbox = mpsc::Receiver<TaskEvent>;

/// Messages delivered for every task, always `Result` then `Finished`.
///
/// `generation` is the controller's run generation when the task started; it lets the controller
/// recognise results of runs the user has since gone back from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Output text, or the rendered error if the action failed or panicked.
    Result {
        step: usize,
        generation: u64,
        outcome: Result<String, String>,
    },
    Finished {
        step: usize,
        generation: u64,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("a task for step {0} is still running")]
    Busy(usize),
}

pub struct TaskRunner {
    events: mpsc::Sender<TaskEvent>,
    outstanding: Option<usize>,
}

impl TaskRunner {
    pub fn new() -> (Self, Mailbox) {
        let (events, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        (
            Self {
                events,
                outstanding: None,
            },
            mailbox,
        )
    }

    /// Step index of the task in flight, if any.
    pub fn outstanding(&self) -> Option<usize> {
        self.outstanding
    }

    pub fn is_busy(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Start `action` on `input`. Refuses while a previous task has not reported `Finished`.
    pub fn run(
        &mut self,
        step: usize,
        generation: u64,
        action: StepAction,
        ctx: TaskContext,
        input: String,
    ) -> Result<(), RunnerError> {
        if let Some(running) = self.outstanding {
            return Err(RunnerError::Busy(running));
        }
        self.outstanding = Some(step);

        let events = self.events.clone();
        tokio::spawn(async move {
            let work = async move { action(ctx, input).await };
            let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(text)) => Ok(text),
                Ok(Err(err)) => Err(format!("{err:#}")),
                Err(panic) => Err(panic_message(panic.as_ref())),
            };
            tracing::debug!(step, generation, ok = outcome.is_ok(), "Task completed");
            // The controller may already be gone on shutdown.
            let _ = events
                .send(TaskEvent::Result {
                    step,
                    generation,
                    outcome,
                })
                .await;
            let _ = events.send(TaskEvent::Finished { step, generation }).await;
        });
        Ok(())
    }

    /// Mark the outstanding task as done; called when its `Finished` event is consumed.
    pub fn finished(&mut self, step: usize) {
        if self.outstanding == Some(step) {
            self.outstanding = None;
        } else {
            tracing::warn!(step, outstanding = ?self.outstanding, "Finished event for an unknown task");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("task panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("task panicked: {msg}")
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::orchestrator::step_action;

    fn ctx() -> TaskContext {
        TaskContext {
            settings: Settings::default(),
            document_title: String::new(),
        }
    }

    fn upper() -> StepAction {
        step_action(|_ctx, input| async move { Ok(input.to_uppercase()) })
    }

    #[tokio::test]
    async fn result_precedes_finished() {
        let (mut runner, mut mailbox) = TaskRunner::new();
        runner.run(2, 7, upper(), ctx(), "abc".into()).unwrap();
        assert_eq!(
            mailbox.recv().await,
            Some(TaskEvent::Result {
                step: 2,
                generation: 7,
                outcome: Ok("ABC".into())
            })
        );
        assert_eq!(mailbox.recv().await, Some(TaskEvent::Finished {
                step: 2,
                generation: 7
            }));
        runner.finished(2);
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn second_run_is_rejected_until_finished() {
        let (mut runner, mut mailbox) = TaskRunner::new();
        runner.run(0, 0, upper(), ctx(), "a".into()).unwrap();
        assert_eq!(
            runner.run(0, 0, upper(), ctx(), "b".into()),
            Err(RunnerError::Busy(0))
        );
        let _ = mailbox.recv().await;
        let _ = mailbox.recv().await;
        runner.finished(0);
        assert!(runner.run(0, 0, upper(), ctx(), "c".into()).is_ok());
    }

    #[tokio::test]
    async fn errors_and_panics_become_error_results() {
        let (mut runner, mut mailbox) = TaskRunner::new();
        let failing = step_action(|_ctx, _input| async move { Err(anyhow::anyhow!("disk on fire")) });
        runner.run(1, 0, failing, ctx(), String::new()).unwrap();
        match mailbox.recv().await {
            Some(TaskEvent::Result { outcome: Err(err), .. }) => {
                assert!(err.contains("disk on fire"))
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(mailbox.recv().await, Some(TaskEvent::Finished {
                step: 1,
                generation: 0
            }));
        runner.finished(1);

        let panicking = step_action(|_ctx, input: String| async move {
            if input.is_empty() {
                panic!("boom");
            }
            Ok(input)
        });
        runner.run(1, 0, panicking, ctx(), String::new()).unwrap();
        match mailbox.recv().await {
            Some(TaskEvent::Result { outcome: Err(err), .. }) => assert!(err.contains("boom")),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(mailbox.recv().await, Some(TaskEvent::Finished {
                step: 1,
                generation: 0
            }));
    }
}
