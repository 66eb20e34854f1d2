//! Shared test utilities: recording hooks, a recording host and a registry
//! already driven to RESUMED.

#![allow(dead_code, unused_imports)]

use std::sync::Arc;

use fragment_stack::{
    AnimationRequest, ComponentHooks, ComponentId, ComponentManager, ContainerId, Hook, HookCx,
    Host, LifecycleState, Looper, SharedHost,
};
use fragment_stack::config::ManagerConfig;
use parking_lot::Mutex;
use serde_json::Value;

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Hooks that log every callback as `name:Event`.
pub struct RecordingHooks {
    name: String,
    log: EventLog,
    /// Contract hook that "forgets" to call through.
    pub skip: Option<Hook>,
    /// Postpone the enter transition every time the view is created.
    pub postpone: bool,
    /// Blob returned from `save_state`.
    pub state: Option<Value>,
}

impl RecordingHooks {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
            skip: None,
            postpone: false,
            state: None,
        }
    }

    pub fn skipping(mut self, hook: Hook) -> Self {
        self.skip = Some(hook);
        self
    }

    pub fn postponing(mut self) -> Self {
        self.postpone = true;
        self
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    fn push(&self, event: impl std::fmt::Display) {
        self.log.lock().push(format!("{}:{}", self.name, event));
    }

    fn contract(&self, cx: &mut HookCx<'_>, hook: Hook) {
        self.push(format!("{:?}", hook));
        if self.skip != Some(hook) {
            cx.call_through();
        }
    }
}

impl ComponentHooks for RecordingHooks {
    fn on_attach(&mut self, cx: &mut HookCx<'_>) {
        self.contract(cx, Hook::Attach);
    }

    fn on_create(&mut self, cx: &mut HookCx<'_>) {
        self.contract(cx, Hook::Create);
    }

    fn on_create_view(&mut self, cx: &mut HookCx<'_>) -> bool {
        self.push("CreateView");
        cx.container().is_some()
    }

    fn on_view_created(&mut self, cx: &mut HookCx<'_>) {
        self.push("ViewCreated");
        if self.postpone {
            cx.postpone_enter();
        }
    }

    fn on_view_ready(&mut self, cx: &mut HookCx<'_>) {
        self.contract(cx, Hook::ViewReady);
    }

    fn on_start(&mut self, cx: &mut HookCx<'_>) {
        self.contract(cx, Hook::Start);
    }

    fn on_resume(&mut self, cx: &mut HookCx<'_>) {
        self.contract(cx, Hook::Resume);
    }

    fn on_pause(&mut self, cx: &mut HookCx<'_>) {
        self.contract(cx, Hook::Pause);
    }

    fn on_stop(&mut self, cx: &mut HookCx<'_>) {
        self.contract(cx, Hook::Stop);
    }

    fn on_destroy_view(&mut self, cx: &mut HookCx<'_>) {
        self.contract(cx, Hook::DestroyView);
    }

    fn on_destroy(&mut self, cx: &mut HookCx<'_>) {
        self.contract(cx, Hook::Destroy);
    }

    fn on_detach(&mut self, cx: &mut HookCx<'_>) {
        self.contract(cx, Hook::Detach);
    }

    fn on_hidden_changed(&mut self, hidden: bool) {
        self.push(format!("Hidden({})", hidden));
    }

    fn save_state(&mut self) -> Option<Value> {
        self.state.clone()
    }
}

/// Host that records view traffic and optionally plays exit animations.
#[derive(Debug, Default)]
pub struct RecordingHost {
    /// Known mount points. `None` accepts every container.
    pub containers: Option<Vec<u32>>,
    /// Report exit animations as running until `finish_animation`.
    pub animate_exits: bool,
    pub events: Vec<String>,
    pub animations: Vec<AnimationRequest>,
}

impl Host for RecordingHost {
    fn has_container(&self, container: ContainerId) -> bool {
        self.containers
            .as_ref()
            .map_or(true, |known| known.contains(&container.0))
    }

    fn attach_view(&mut self, component: ComponentId, container: Option<ContainerId>) {
        self.events.push(format!("attach {} {:?}", component, container));
    }

    fn detach_view(&mut self, component: ComponentId, container: Option<ContainerId>) {
        self.events.push(format!("detach {} {:?}", component, container));
    }

    fn set_view_visible(&mut self, component: ComponentId, visible: bool) {
        self.events.push(format!("visible {} {}", component, visible));
    }

    fn start_animation(&mut self, request: &AnimationRequest) -> bool {
        self.animations.push(request.clone());
        !request.enter && self.animate_exits
    }

    fn cancel_animation(&mut self, component: ComponentId) {
        self.events.push(format!("cancel {}", component));
    }

    fn set_modal_visible(&mut self, component: ComponentId, visible: bool) {
        self.events.push(format!("modal {} {}", component, visible));
    }
}

/// A registry wired to a recording host and an in-process looper.
pub struct Harness {
    pub manager: ComponentManager,
    pub looper: Arc<Looper>,
    pub host: Arc<Mutex<RecordingHost>>,
    pub log: EventLog,
}

impl Harness {
    /// A registry that has not been dispatched anywhere yet.
    pub fn new() -> Self {
        Self::with_host(RecordingHost::default())
    }

    pub fn with_host(host: RecordingHost) -> Self {
        let looper = Looper::new();
        let host = Arc::new(Mutex::new(host));
        let shared: SharedHost = host.clone();
        let manager = ComponentManager::new(ManagerConfig::default(), shared, looper.clone());
        Self {
            manager,
            looper,
            host,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A registry already moved to RESUMED.
    pub fn resumed() -> Self {
        let mut harness = Self::new();
        harness.resume();
        harness
    }

    pub fn resume(&mut self) {
        self.manager.dispatch_create().unwrap();
        self.manager.dispatch_view_ready().unwrap();
        self.manager.dispatch_start().unwrap();
        self.manager.dispatch_resume().unwrap();
    }

    pub fn component(&mut self, name: &str) -> ComponentId {
        let hooks = RecordingHooks::new(name, &self.log);
        self.manager.create(name, hooks)
    }

    pub fn component_with(&mut self, name: &str, hooks: RecordingHooks) -> ComponentId {
        self.manager.create(name, hooks)
    }

    pub fn hooks(&self, name: &str) -> RecordingHooks {
        RecordingHooks::new(name, &self.log)
    }

    /// Run every scheduled drain.
    pub fn pump(&mut self) -> usize {
        self.manager.pump(&self.looper).unwrap()
    }

    pub fn state(&self, id: ComponentId) -> LifecycleState {
        self.manager.component(id).unwrap().state()
    }

    pub fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }

    /// Logged callbacks of one component, without the name prefix.
    pub fn events_for(&self, name: &str) -> Vec<String> {
        let prefix = format!("{}:", name);
        self.log
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Mount `id` in `container` without a back stack entry and drain.
    pub fn mount(&mut self, container: u32, id: ComponentId) {
        let mut tx = self.manager.begin_transaction();
        tx.add_to(ContainerId(container), id, None).unwrap();
        tx.commit(&mut self.manager).unwrap();
        self.pump();
    }
}
