use statig::{blocking::IntoStateMachineExt as _, prelude::*};

use super::{status::LINK_CODE_OK, LinkStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum LinkEvent {
    ConnectRequested,
    Status(u8),
    ConnectTimeout(u8),
    EngineLost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkTransition {
    Connecting,
    Up,
    Failed(u8),
    Lost,
}

#[derive(Default)]
pub(super) struct DispatchContext {
    next: Option<LinkStatus>,
    transition: Option<LinkTransition>,
}

impl DispatchContext {
    fn enter(&mut self, status: LinkStatus, transition: LinkTransition) {
        self.next = Some(status);
        self.transition = Some(transition);
    }
}

pub(super) struct LinkStateMachine {
    machine: statig::blocking::StateMachine<LinkHsm>,
    status: LinkStatus,
}

impl LinkStateMachine {
    pub(super) fn new() -> Self {
        Self {
            machine: LinkHsm.state_machine(),
            status: LinkStatus::Down,
        }
    }

    pub(super) fn status(&self) -> LinkStatus {
        self.status
    }

    pub(super) fn dispatch(&mut self, event: LinkEvent) -> Option<LinkTransition> {
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(&event, &mut context);
        if let Some(next) = context.next {
            self.status = next;
        }
        context.transition
    }
}

struct LinkHsm;

#[state_machine(initial = "State::down()")]
impl LinkHsm {
    #[state]
    fn down(&mut self, context: &mut DispatchContext, event: &LinkEvent) -> Outcome<State> {
        match event {
            LinkEvent::ConnectRequested => {
                context.enter(LinkStatus::Connecting, LinkTransition::Connecting);
                Transition(State::connecting())
            }
            LinkEvent::Status(code) => on_status(context, *code),
            LinkEvent::ConnectTimeout(_) | LinkEvent::EngineLost => Handled,
        }
    }

    #[state]
    fn connecting(&mut self, context: &mut DispatchContext, event: &LinkEvent) -> Outcome<State> {
        match event {
            LinkEvent::ConnectRequested => Handled,
            LinkEvent::Status(code) => on_status(context, *code),
            LinkEvent::ConnectTimeout(code) => {
                context.enter(LinkStatus::Error(*code), LinkTransition::Failed(*code));
                Transition(State::error())
            }
            LinkEvent::EngineLost => lost(context),
        }
    }

    #[state]
    fn up(&mut self, context: &mut DispatchContext, event: &LinkEvent) -> Outcome<State> {
        match event {
            LinkEvent::ConnectRequested | LinkEvent::ConnectTimeout(_) => Handled,
            LinkEvent::Status(LINK_CODE_OK) => Handled,
            LinkEvent::Status(code) => on_status(context, *code),
            LinkEvent::EngineLost => lost(context),
        }
    }

    #[state]
    fn error(&mut self, context: &mut DispatchContext, event: &LinkEvent) -> Outcome<State> {
        match event {
            LinkEvent::ConnectRequested => {
                context.enter(LinkStatus::Connecting, LinkTransition::Connecting);
                Transition(State::connecting())
            }
            LinkEvent::Status(LINK_CODE_OK) => on_status(context, LINK_CODE_OK),
            LinkEvent::Status(code) => {
                // Repeated failure while already failed: keep the newest code, no new transition.
                context.next = Some(LinkStatus::Error(*code));
                Handled
            }
            LinkEvent::ConnectTimeout(_) => Handled,
            LinkEvent::EngineLost => lost(context),
        }
    }
}

fn on_status(context: &mut DispatchContext, code: u8) -> Outcome<State> {
    if code == LINK_CODE_OK {
        context.enter(LinkStatus::Up, LinkTransition::Up);
        Transition(State::up())
    } else {
        context.enter(LinkStatus::Error(code), LinkTransition::Failed(code));
        Transition(State::error())
    }
}

fn lost(context: &mut DispatchContext) -> Outcome<State> {
    context.enter(LinkStatus::Down, LinkTransition::Lost);
    Transition(State::down())
}
