//! Wizard orchestration: step panels, the background task runner and the controller that
//! sequences them. UI layers only talk to [`WizardController`] (directly or through
//! [`run_controller`]).

mod controller;
mod panel;
mod runner;
mod wizard;

pub use controller::{run_controller, FieldView, UiCommand, WizardController, WizardView};
pub use panel::{
    is_supported, step_action, FieldKind, FieldRequest, PanelField, StepAction, StepPanel,
    StepperBounds, TaskContext, SUPPORTED_FORMATS,
};
pub use runner::{Mailbox, RunnerError, TaskEvent, TaskRunner};
pub use wizard::{build_steps, build_wizard};
