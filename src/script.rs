//! TOML scenario scripts for the `run` subcommand.
//!
//! A script declares named components and a list of steps. The runner
//! drives one registry through an in-process [`Looper`], pumping scheduled
//! drains after every step, and reports what happened.
//!
//! ```toml
//! containers = [1]
//!
//! [[components]]
//! name = "list"
//!
//! [[steps]]
//! action = "dispatch"
//! to = "resume"
//!
//! [[steps]]
//! action = "commit"
//! back_stack = "first"
//! ops = [{ op = "add", component = "list", container = 1 }]
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::back_stack::{BackStackEntry, BackStackId, PopTarget};
use crate::component::{ComponentHooks, ComponentId, ContainerId, HookCx, LifecycleState};
use crate::config::ManagerConfig;
use crate::error::ManagerError;
use crate::host::{AnimationRequest, Host};
use crate::lifecycle::{LifecycleCallbacks, LifecycleEvent};
use crate::manager::{ComponentManager, SavedRegistryState};
use crate::scheduler::Looper;
use crate::transaction::Transaction;

/// Errors raised while loading or running a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse script '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("component '{0}' is declared twice")]
    DuplicateComponent(String),

    #[error("step {step}: unknown component '{name}'")]
    UnknownComponent { step: usize, name: String },

    #[error("step {step} failed: {source}")]
    Step {
        step: usize,
        #[source]
        source: ManagerError,
    },

    #[error("saving state failed: {0}")]
    Save(#[source] ManagerError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Mount points the host knows. Empty accepts every container.
    #[serde(default)]
    pub containers: Vec<u32>,
    #[serde(default)]
    pub components: Vec<ComponentDecl>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentDecl {
    pub name: String,
    /// Defaults to the name.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub modal: bool,
    /// Delay the enter transition until a `ready` step.
    #[serde(default)]
    pub postpone: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    Commit {
        ops: Vec<ScriptOp>,
        /// Back stack entry name; an empty string adds an unnamed entry.
        #[serde(default)]
        back_stack: Option<String>,
        #[serde(default)]
        reordering: bool,
        #[serde(default)]
        now: bool,
        #[serde(default)]
        allow_state_loss: bool,
        #[serde(default)]
        enter: Option<String>,
        #[serde(default)]
        exit: Option<String>,
    },
    Pop {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        id: Option<i64>,
        #[serde(default)]
        inclusive: bool,
        #[serde(default)]
        immediate: bool,
    },
    Dispatch {
        to: DispatchTarget,
    },
    Ready {
        component: String,
    },
    FinishAnimation {
        component: String,
    },
    Execute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchTarget {
    Create,
    ViewReady,
    Start,
    Resume,
    Pause,
    Stop,
    DestroyView,
    Destroy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum ScriptOp {
    Add {
        component: String,
        #[serde(default)]
        container: Option<u32>,
        #[serde(default)]
        tag: Option<String>,
    },
    Replace {
        component: String,
        container: u32,
        #[serde(default)]
        tag: Option<String>,
    },
    Remove {
        component: String,
    },
    Hide {
        component: String,
    },
    Show {
        component: String,
    },
    Detach {
        component: String,
    },
    Attach {
        component: String,
    },
    SetPrimary {
        #[serde(default)]
        component: Option<String>,
    },
    SetMaxLifecycle {
        component: String,
        state: LifecycleState,
    },
}

impl Script {
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path).map_err(|e| ScriptError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Parse script text. `origin` only labels errors.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ScriptError> {
        toml::from_str(content).map_err(|e| ScriptError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })
    }
}

type EventLog = Arc<Mutex<Vec<String>>>;

/// Behaviour of script-declared components.
struct ScriptHooks {
    postpone: bool,
}

impl ComponentHooks for ScriptHooks {
    fn on_view_created(&mut self, cx: &mut HookCx<'_>) {
        if self.postpone {
            cx.postpone_enter();
        }
    }
}

/// Host that knows the declared containers and plays every animation that
/// has a key until `finish_animation` is reported.
struct ScriptHost {
    containers: Vec<ContainerId>,
    names: Arc<Mutex<HashMap<ComponentId, String>>>,
    log: EventLog,
}

impl ScriptHost {
    fn name(&self, id: ComponentId) -> String {
        self.names
            .lock()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

impl Host for ScriptHost {
    fn has_container(&self, container: ContainerId) -> bool {
        self.containers.is_empty() || self.containers.contains(&container)
    }

    fn set_view_visible(&mut self, component: ComponentId, visible: bool) {
        let line = format!("{} view visible={}", self.name(component), visible);
        self.log.lock().push(line);
    }

    fn start_animation(&mut self, request: &AnimationRequest) -> bool {
        let Some(anim) = &request.anim else {
            return false;
        };
        let direction = if request.enter { "enter" } else { "exit" };
        let line = format!("{} animate {} '{}'", self.name(request.component), direction, anim);
        self.log.lock().push(line);
        true
    }

    fn set_modal_visible(&mut self, component: ComponentId, visible: bool) {
        let line = format!("{} modal visible={}", self.name(component), visible);
        self.log.lock().push(line);
    }
}

struct ScriptObserver {
    names: Arc<Mutex<HashMap<ComponentId, String>>>,
    log: EventLog,
}

impl LifecycleCallbacks for ScriptObserver {
    fn on_event(&self, component: ComponentId, kind: &str, event: LifecycleEvent) {
        let name = self
            .names
            .lock()
            .get(&component)
            .cloned()
            .unwrap_or_else(|| kind.to_string());
        self.log.lock().push(format!("{} {:?}", name, event));
    }
}

/// Final state of one declared component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSummary {
    pub name: String,
    pub state: LifecycleState,
    pub added: bool,
    pub hidden: bool,
    pub back_stack_nesting: u32,
}

/// What a script run produced.
#[derive(Debug, Clone)]
pub struct ScriptReport {
    pub events: Vec<String>,
    pub components: Vec<ComponentSummary>,
    pub back_stack: Vec<BackStackEntry>,
    pub drains: usize,
    pub saved: Option<SavedRegistryState>,
}

impl ScriptReport {
    pub fn component(&self, name: &str) -> Option<&ComponentSummary> {
        self.components.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for ScriptReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "events:")?;
        for event in &self.events {
            writeln!(f, "  {}", event)?;
        }
        writeln!(f, "components:")?;
        for c in &self.components {
            writeln!(
                f,
                "  {:<16} {:<12} added={} hidden={} nesting={}",
                c.name,
                c.state.as_str(),
                c.added,
                c.hidden,
                c.back_stack_nesting
            )?;
        }
        writeln!(f, "back stack ({} entries):", self.back_stack.len())?;
        for entry in &self.back_stack {
            let id = entry.id.map(|id| id.to_string()).unwrap_or_default();
            writeln!(f, "  {} {}", id, entry.name.as_deref().unwrap_or("-"))?;
        }
        write!(f, "drains: {}", self.drains)
    }
}

/// Drives one registry through a script.
pub struct ScriptRunner {
    manager: ComponentManager,
    looper: Arc<Looper>,
    components: IndexMap<String, ComponentId>,
    log: EventLog,
    drains: usize,
}

impl ScriptRunner {
    pub fn new(script: &Script, config: ManagerConfig) -> Result<Self, ScriptError> {
        let log: EventLog = Arc::default();
        let names: Arc<Mutex<HashMap<ComponentId, String>>> = Arc::default();
        let host = ScriptHost {
            containers: script.containers.iter().copied().map(ContainerId).collect(),
            names: Arc::clone(&names),
            log: Arc::clone(&log),
        };
        let looper = Looper::new();
        let mut manager =
            ComponentManager::new(config, Arc::new(Mutex::new(host)), looper.clone());
        manager.register_lifecycle_callbacks(
            Arc::new(ScriptObserver {
                names: Arc::clone(&names),
                log: Arc::clone(&log),
            }),
            true,
        );

        let mut components = IndexMap::new();
        for decl in &script.components {
            if components.contains_key(&decl.name) {
                return Err(ScriptError::DuplicateComponent(decl.name.clone()));
            }
            let kind = decl.kind.as_deref().unwrap_or(&decl.name);
            let hooks = ScriptHooks {
                postpone: decl.postpone,
            };
            let id = if decl.modal {
                manager.create_modal(kind, hooks, true)
            } else {
                manager.create(kind, hooks)
            };
            names.lock().insert(id, decl.name.clone());
            components.insert(decl.name.clone(), id);
        }

        Ok(Self {
            manager,
            looper,
            components,
            log,
            drains: 0,
        })
    }

    pub fn manager(&self) -> &ComponentManager {
        &self.manager
    }

    fn lookup(&self, step: usize, name: &str) -> Result<ComponentId, ScriptError> {
        self.components
            .get(name)
            .copied()
            .ok_or_else(|| ScriptError::UnknownComponent {
                step,
                name: name.to_string(),
            })
    }

    /// Run every step, then pump until idle.
    pub fn run(&mut self, script: &Script) -> Result<(), ScriptError> {
        for (i, step) in script.steps.iter().enumerate() {
            let number = i + 1;
            debug!(number, ?step, "script step");
            self.run_step(number, step)?;
            self.pump(number)?;
        }
        Ok(())
    }

    fn pump(&mut self, step: usize) -> Result<(), ScriptError> {
        let ran = self
            .manager
            .pump(&self.looper)
            .map_err(|source| ScriptError::Step { step, source })?;
        self.drains += ran;
        Ok(())
    }

    fn run_step(&mut self, step: usize, action: &Step) -> Result<(), ScriptError> {
        let failed = |source| ScriptError::Step { step, source };
        match action {
            Step::Commit {
                ops,
                back_stack,
                reordering,
                now,
                allow_state_loss,
                enter,
                exit,
            } => {
                let mut tx = self.manager.begin_transaction();
                tx.set_reordering_allowed(*reordering).map_err(failed)?;
                if enter.is_some() || exit.is_some() {
                    let (enter, exit) = (enter.as_deref(), exit.as_deref());
                    tx.set_custom_animations(enter, exit, enter, exit)
                        .map_err(failed)?;
                }
                for op in ops {
                    self.push_op(step, &mut tx, op)?;
                }
                if let Some(name) = back_stack {
                    let name = (!name.is_empty()).then_some(name.as_str());
                    tx.add_to_back_stack(name).map_err(failed)?;
                }
                let manager = &mut self.manager;
                match (*now, *allow_state_loss) {
                    (true, false) => tx.commit_now(manager).map_err(failed)?,
                    (true, true) => tx.commit_now_allowing_state_loss(manager).map_err(failed)?,
                    (false, false) => {
                        tx.commit(manager).map_err(failed)?;
                    }
                    (false, true) => {
                        tx.commit_allowing_state_loss(manager).map_err(failed)?;
                    }
                }
            }
            Step::Pop {
                name,
                id,
                inclusive,
                immediate,
            } => {
                let target = match (name, id) {
                    (Some(name), _) => PopTarget::Name(name.clone()),
                    (None, Some(id)) => PopTarget::Id(BackStackId::new(*id).map_err(failed)?),
                    (None, None) => PopTarget::Top,
                };
                if *immediate {
                    let popped = self
                        .manager
                        .pop_back_stack_immediate(target, *inclusive)
                        .map_err(failed)?;
                    self.log.lock().push(format!("pop immediate popped={}", popped));
                } else {
                    self.manager
                        .pop_back_stack(target, *inclusive)
                        .map_err(failed)?;
                }
            }
            Step::Dispatch { to } => {
                let manager = &mut self.manager;
                let result = match to {
                    DispatchTarget::Create => manager.dispatch_create(),
                    DispatchTarget::ViewReady => manager.dispatch_view_ready(),
                    DispatchTarget::Start => manager.dispatch_start(),
                    DispatchTarget::Resume => manager.dispatch_resume(),
                    DispatchTarget::Pause => manager.dispatch_pause(),
                    DispatchTarget::Stop => manager.dispatch_stop(),
                    DispatchTarget::DestroyView => manager.dispatch_destroy_view(),
                    DispatchTarget::Destroy => manager.dispatch_destroy(),
                };
                result.map_err(failed)?;
            }
            Step::Ready { component } => {
                let id = self.lookup(step, component)?;
                self.manager.start_postponed_enter(id).map_err(failed)?;
            }
            Step::FinishAnimation { component } => {
                let id = self.lookup(step, component)?;
                self.manager.finish_animation(id).map_err(failed)?;
            }
            Step::Execute => {
                let updated = self
                    .manager
                    .execute_pending_transactions()
                    .map_err(failed)?;
                self.log.lock().push(format!("execute updated={}", updated));
            }
        }
        Ok(())
    }

    fn push_op(
        &self,
        step: usize,
        tx: &mut Transaction,
        op: &ScriptOp,
    ) -> Result<(), ScriptError> {
        let failed = |source| ScriptError::Step { step, source };
        match op {
            ScriptOp::Add {
                component,
                container,
                tag,
            } => {
                let id = self.lookup(step, component)?;
                match container {
                    Some(container) => tx.add_to(ContainerId(*container), id, tag.as_deref()),
                    None => tx.add(id, tag.as_deref()),
                }
                .map_err(failed)?;
            }
            ScriptOp::Replace {
                component,
                container,
                tag,
            } => {
                let id = self.lookup(step, component)?;
                tx.replace(ContainerId(*container), id, tag.as_deref())
                    .map_err(failed)?;
            }
            ScriptOp::Remove { component } => {
                tx.remove(self.lookup(step, component)?).map_err(failed)?;
            }
            ScriptOp::Hide { component } => {
                tx.hide(self.lookup(step, component)?).map_err(failed)?;
            }
            ScriptOp::Show { component } => {
                tx.show(self.lookup(step, component)?).map_err(failed)?;
            }
            ScriptOp::Detach { component } => {
                tx.detach(self.lookup(step, component)?).map_err(failed)?;
            }
            ScriptOp::Attach { component } => {
                tx.attach(self.lookup(step, component)?).map_err(failed)?;
            }
            ScriptOp::SetPrimary { component } => {
                let id = match component {
                    Some(name) => Some(self.lookup(step, name)?),
                    None => None,
                };
                tx.set_primary(id).map_err(failed)?;
            }
            ScriptOp::SetMaxLifecycle { component, state } => {
                let id = self.lookup(step, component)?;
                tx.set_max_lifecycle(id, *state).map_err(failed)?;
            }
        }
        Ok(())
    }

    /// Summarize the run. With `save`, the registry state is saved too.
    pub fn finish(mut self, save: bool) -> Result<ScriptReport, ScriptError> {
        let saved = if save {
            Some(self.manager.save_state().map_err(ScriptError::Save)?)
        } else {
            None
        };

        let components = self
            .components
            .iter()
            .filter_map(|(name, id)| {
                let component = self.manager.component(*id)?;
                Some(ComponentSummary {
                    name: name.clone(),
                    state: component.state(),
                    added: component.is_added(),
                    hidden: component.is_hidden(),
                    back_stack_nesting: component.back_stack_nesting(),
                })
            })
            .collect();
        let back_stack = (0..self.manager.back_stack_entry_count())
            .filter_map(|i| self.manager.back_stack_entry_at(i))
            .collect();

        let events = std::mem::take(&mut *self.log.lock());
        info!(events = events.len(), drains = self.drains, "script finished");
        Ok(ScriptReport {
            events,
            components,
            back_stack,
            drains: self.drains,
            saved,
        })
    }
}

/// Run `script` on a fresh registry and report.
pub fn run_script(
    script: &Script,
    config: ManagerConfig,
    save: bool,
) -> Result<ScriptReport, ScriptError> {
    let mut runner = ScriptRunner::new(script, config)?;
    runner.run(script)?;
    runner.finish(save)
}
