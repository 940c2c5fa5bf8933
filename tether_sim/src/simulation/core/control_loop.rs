// tether_sim/src/simulation/core/control_loop.rs

//! The orchestrator: one tick drains remote traffic, applies local and remote
//! commands through the adapter, steps the world, audits it and broadcasts.

use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};
use tether_core::prelude::*;
use tether_core::wire;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::app_state::ControlState;
use super::bus::{MessageBus, Subscription};
use super::inbox::{CommandInbox, InboxBatch};
use crate::simulation::config::{BusSection, RoleChannels, ScenarioConfig, WarningStyle};

// =========================================================================
// == Settings & Report ==
// =========================================================================

/// Everything the loop needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub bus: BusSection,
    pub entities: SceneEntities,
    pub redundancy: RedundancyPolicy,
    pub force_ceiling: f64,
    pub monitor: ViolationMonitor,
    /// Publish a snapshot every N ticks.
    pub broadcast_every: u64,
    pub max_ticks: Option<u64>,
    /// When set, `run` sleeps out the rest of each step.
    pub pacing: Option<Duration>,
    pub violation_warning: WarningStyle,
    pub task_notice: WarningStyle,
    pub reset_on_done: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            bus: BusSection::default(),
            entities: SceneEntities::default(),
            redundancy: RedundancyPolicy::default(),
            force_ceiling: DEFAULT_FORCE_CEILING,
            monitor: ViolationMonitor::new(),
            broadcast_every: 1,
            max_ticks: None,
            pacing: None,
            violation_warning: WarningStyle::default(),
            task_notice: WarningStyle::task_complete(),
            reset_on_done: true,
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &ScenarioConfig) -> Self {
        let sim = &config.simulation;
        Self {
            bus: config.bus.clone(),
            entities: config.scene.entities(),
            redundancy: config.control.redundancy,
            force_ceiling: config.control.max_force,
            monitor: config.safety.monitor(),
            broadcast_every: sim.broadcast_every.max(1),
            max_ticks: sim.max_ticks,
            pacing: sim
                .real_time
                .then(|| Duration::from_secs_f64(sim.step_size)),
            violation_warning: config.safety.warning.clone(),
            task_notice: config
                .task
                .as_ref()
                .map_or_else(WarningStyle::task_complete, |t| t.notice.clone()),
            reset_on_done: config.task.as_ref().map_or(true, |t| t.reset_on_done),
        }
    }
}

/// Running counters of what the loop did. Recoverable failures only ever
/// show up here and in the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub ticks: u64,
    pub local_events: u64,
    pub remote_updates: u64,
    /// Commands the adapter accepted.
    pub applied: u64,
    pub suppressed: u64,
    pub stale: u64,
    pub unmapped: u64,
    pub violations: u64,
    pub adapter_errors: u64,
    pub malformed: u64,
    /// Well-formed payloads taken off the inbound channel.
    pub received: u64,
    pub broadcasts: u64,
    pub warnings_sent: u64,
    pub resets: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
}

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("failed to initialize the simulation: {0}")]
    Initialize(#[source] AdapterError),

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: ControlState,
    },
}

// =========================================================================
// == Control Loop ==
// =========================================================================

pub struct ControlLoop<A: SimulationAdapter, S: EventSource> {
    adapter: A,
    source: S,
    bus: MessageBus,
    inbox: CommandInbox,
    subscriptions: Vec<Subscription>,
    settings: LoopSettings,
    translator: CommandTranslator,
    task: Option<Box<dyn TaskChecker>>,
    role: Role,
    channels: RoleChannels,

    state: ControlState,
    mapping: ControlMapping,
    filter: RedundancyFilter,
    /// Last pose of each arm link that passed the audit.
    known_good: BTreeMap<BodyId, Pose>,
    report: LoopReport,
}

impl<A: SimulationAdapter, S: EventSource> ControlLoop<A, S> {
    pub fn new(adapter: A, source: S, bus: MessageBus, settings: LoopSettings) -> Self {
        let role = source.role();
        let channels = settings.bus.channels_for(role);
        Self {
            translator: CommandTranslator::new(settings.force_ceiling),
            adapter,
            source,
            bus,
            inbox: CommandInbox::new(),
            subscriptions: Vec::new(),
            settings,
            task: None,
            role,
            channels,
            state: ControlState::Uninitialized,
            mapping: ControlMapping::default(),
            filter: RedundancyFilter::default(),
            known_good: BTreeMap::new(),
            report: LoopReport::default(),
        }
    }

    /// Builds a loop from a scenario, including its task checker if any.
    pub fn from_config(adapter: A, source: S, bus: MessageBus, config: &ScenarioConfig) -> Self {
        let mut control = Self::new(adapter, source, bus, LoopSettings::from_config(config));
        if let Some(task) = &config.task {
            control.task = Some(task.checker());
        }
        control
    }

    pub fn with_task(mut self, task: Box<dyn TaskChecker>) -> Self {
        self.task = Some(task);
        self
    }

    // --- Accessors ---

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn report(&self) -> LoopReport {
        self.report
    }

    pub fn mapping(&self) -> &ControlMapping {
        &self.mapping
    }

    pub fn primary(&self) -> Option<ControllerId> {
        self.filter.primary()
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn inbound_channel(&self) -> &str {
        &self.channels.inbound
    }

    /// The state feed an observer mirrors, if any.
    pub fn mirror_channel(&self) -> Option<&str> {
        self.channels.mirror.as_deref()
    }

    pub fn outbound_channel(&self) -> &str {
        &self.channels.outbound
    }

    /// Routes `controller` to `entity` until the next reset, e.g. to hand a
    /// second controller the same arm. The redundancy filter is re-derived.
    pub fn reassign(
        &mut self,
        category: Category,
        controller: ControllerId,
        entity: EntityId,
    ) -> Option<EntityId> {
        let previous = self.mapping.insert(category, controller, entity);
        self.filter =
            RedundancyFilter::for_policy(self.settings.redundancy, &self.mapping, &self.settings.entities);
        info!(
            "Controller {} now drives {} {} (was {:?}).",
            controller, category, entity, previous
        );
        previous
    }

    // --- Lifecycle ---

    /// Connects and resets the backend, captures the controller set and
    /// builds the mapping. Also used to honour RESET.
    pub fn initialize(&mut self) -> Result<(), LoopError> {
        if self.state.is_terminal() {
            return Err(LoopError::InvalidState {
                action: "initialize",
                state: self.state,
            });
        }
        self.adapter.connect().map_err(LoopError::Initialize)?;
        self.adapter.reset().map_err(LoopError::Initialize)?;

        let controllers = self.source.controllers();
        self.mapping = ControlMapping::build(&controllers, &self.settings.entities);
        self.filter =
            RedundancyFilter::for_policy(self.settings.redundancy, &self.mapping, &self.settings.entities);
        self.capture_known_good();

        info!(
            "Control loop ready as {:?}: {} controllers, primary {:?}.",
            self.role,
            controllers.len(),
            self.filter.primary()
        );
        self.state = ControlState::Ready;
        Ok(())
    }

    /// Subscribes to the command channel (and, for observers, the mirrored
    /// state channel) and begins accepting ticks.
    pub fn start(&mut self) -> Result<(), LoopError> {
        if self.state != ControlState::Ready {
            return Err(LoopError::InvalidState {
                action: "start",
                state: self.state,
            });
        }
        if self.subscriptions.is_empty() {
            let feeds = std::iter::once(&self.channels.inbound).chain(self.channels.mirror.as_ref());
            for channel in feeds {
                self.subscriptions
                    .push(self.bus.subscribe(channel, self.inbox.handler()));
            }
        }
        info!(
            "Listening on '{}' (mirror {:?}), publishing on '{}'.",
            self.channels.inbound, self.channels.mirror, self.channels.outbound
        );
        self.state = ControlState::Running;
        Ok(())
    }

    /// Executes one iteration. Does nothing unless running.
    pub fn tick(&mut self) -> ControlState {
        if !self.state.is_running() {
            return self.state;
        }

        // 1. Remote traffic.
        let batch = self.inbox.drain();
        self.report.malformed += batch.malformed;
        self.report.received += batch.received;
        if batch.shutdown {
            info!("SHUTDOWN received, stopping.");
            self.state = ControlState::Stopping;
            return self.state;
        }
        if batch.reset {
            info!("RESET received.");
            self.reset_episode();
            if !self.state.is_running() {
                return self.state;
            }
        }
        for warning in &batch.warnings {
            info!("Notice from upstream: {}", warning.text);
        }

        // 2. Local controller events.
        self.apply_local_events();

        // 3. Queued remote pose updates. Remote is the last writer.
        self.apply_remote_updates(batch);

        // 4. Advance the world.
        if let Err(e) = self.adapter.step() {
            self.report.adapter_errors += 1;
            warn!("Simulation step failed: {}", e);
        }

        // 5. Catch links the solver pushed past a bound.
        self.audit_arm_links();

        self.report.ticks += 1;

        // 6. Broadcast.
        if self.report.ticks % self.settings.broadcast_every.max(1) == 0 {
            // A body list we could not read is not a full picture; skip.
            if let Some(snapshot) = self.snapshot() {
                self.publish(&Instruction::PoseUpdate(snapshot.clone()));
                self.report.broadcasts += 1;
                self.check_task(&snapshot);
            }
        }

        if let Some(max) = self.settings.max_ticks {
            if self.report.ticks >= max && self.state.is_running() {
                info!("Reached {} ticks, stopping.", max);
                self.state = ControlState::Stopping;
            }
        }
        self.state
    }

    /// Initializes if needed, ticks until stopped, then shuts down.
    pub fn run(&mut self) -> Result<LoopReport, LoopError> {
        if self.state == ControlState::Uninitialized {
            self.initialize()?;
        }
        if self.state == ControlState::Ready {
            self.start()?;
        }
        while self.state.is_running() {
            let started = Instant::now();
            self.tick();
            if let Some(step) = self.settings.pacing {
                if let Some(rest) = step.checked_sub(started.elapsed()) {
                    thread::sleep(rest);
                }
            }
        }
        self.shut_down();
        Ok(self.report)
    }

    /// Releases the inbound channel. The authoritative node also tells every
    /// downstream subscriber to stop.
    pub fn shut_down(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if self.role == Role::Authoritative {
            self.publish(&Instruction::Shutdown);
        }
        for sub in self.subscriptions.drain(..) {
            sub.unsubscribe();
        }
        info!("Control loop shut down after {} ticks.", self.report.ticks);
        self.state = ControlState::ShutDown;
    }

    // --- Tick stages ---

    fn apply_local_events(&mut self) {
        let events = self.source.poll();
        if events.is_empty() {
            return;
        }
        self.report.local_events += events.len() as u64;

        let filtered = self.filter.filter(events, &self.mapping);
        self.report.suppressed += filtered.suppressed as u64;
        self.report.stale += filtered.stale as u64;

        for event in &filtered.events {
            match self.translator.translate(event, &self.mapping) {
                Some(command) => self.apply(command),
                None => {
                    self.report.unmapped += 1;
                    debug!(
                        "Controller {} has no {} to drive.",
                        event.controller, event.category
                    );
                }
            }
        }
    }

    fn apply_remote_updates(&mut self, batch: InboxBatch) {
        for (body, pose) in batch.updates.poses {
            self.report.remote_updates += 1;
            match self
                .translator
                .translate_remote(body, pose, &self.mapping, &self.settings.entities)
            {
                Ok(command) => self.apply(command),
                Err(e) => {
                    self.report.unmapped += 1;
                    debug!("Ignoring remote update for body {}: {}", body, e);
                }
            }
        }
    }

    /// Screens a command and hands it to the adapter.
    fn apply(&mut self, command: Command) {
        if let Err(violation) = self.screen(&command) {
            self.report.violations += 1;
            warn!(
                "Refusing {}: bound '{}' breached.",
                violation.target, violation.bound
            );
            let style = self.settings.violation_warning.clone();
            self.publish_warning(&style, violation.target.id);
            return;
        }

        let target = command.target;
        let result = match command.actuation {
            Actuation::Reposition => self.adapter.set_pose(target.id.body(), &command.pose),
            Actuation::Grip { closure } => self.adapter.actuate_gripper(target.id.body(), closure),
            Actuation::Drive { max_force } => {
                self.adapter
                    .move_constraint(target.id.constraint(), &command.pose, max_force)
            }
        };
        match result {
            Ok(()) => self.report.applied += 1,
            Err(e) => {
                self.report.adapter_errors += 1;
                warn!("Adapter rejected command for {}: {}", target, e);
            }
        }
    }

    /// Arm links repositioned directly are held to the arm bounds too.
    fn screen(&self, command: &Command) -> Result<(), IllegalOperation> {
        let monitor = &self.settings.monitor;
        monitor.check(command)?;
        let target = command.target;
        if target.category == Category::FreeBody
            && self.settings.entities.arm_links.contains(&target.id.body())
        {
            monitor.check_pose(
                EntityRef::new(Category::ArmConstraint, target.id),
                &command.pose,
            )?;
        }
        Ok(())
    }

    fn audit_arm_links(&mut self) {
        if self.settings.monitor.is_empty() {
            return;
        }
        let links = self.settings.entities.arm_links.clone();
        for link in links {
            let pose = match self.adapter.get_pose(link) {
                Ok(pose) => pose,
                Err(e) => {
                    self.report.adapter_errors += 1;
                    debug!("Cannot audit arm link {}: {}", link, e);
                    continue;
                }
            };
            let target = EntityRef::new(Category::ArmConstraint, link.into());
            if self.settings.monitor.check_pose(target, &pose).is_ok() {
                self.known_good.insert(link, pose);
                continue;
            }

            self.report.violations += 1;
            warn!("Arm link {} left its bounds, reverting.", link);
            if let Some(good) = self.known_good.get(&link).copied() {
                if let Err(e) = self.adapter.set_pose(link, &good) {
                    self.report.adapter_errors += 1;
                    warn!("Failed to revert arm link {}: {}", link, e);
                }
            }
            let style = self.settings.violation_warning.clone();
            self.publish_warning(&style, link);
        }
    }

    fn capture_known_good(&mut self) {
        self.known_good.clear();
        for &link in &self.settings.entities.arm_links {
            match self.adapter.get_pose(link) {
                Ok(pose) => {
                    self.known_good.insert(link, pose);
                }
                Err(e) => debug!("No initial pose for arm link {}: {}", link, e),
            }
        }
    }

    fn snapshot(&mut self) -> Option<Snapshot> {
        let bodies = match self.adapter.list_bodies() {
            Ok(bodies) => bodies,
            Err(e) => {
                self.report.adapter_errors += 1;
                warn!("Cannot list bodies, skipping broadcast: {}", e);
                return None;
            }
        };
        let mut snapshot = Snapshot::new();
        for body in bodies {
            match self.adapter.get_pose(body) {
                Ok(pose) => snapshot.insert(body, pose),
                Err(e) => {
                    self.report.adapter_errors += 1;
                    debug!("Skipping body {} in snapshot: {}", body, e);
                }
            }
        }
        Some(snapshot)
    }

    fn check_task(&mut self, snapshot: &Snapshot) {
        if self.role != Role::Authoritative {
            return;
        }
        let Some(task) = self.task.as_mut() else {
            return;
        };
        let status = task.check(snapshot);
        if !status.done {
            return;
        }
        let name = task.name().to_string();

        if status.success {
            self.report.tasks_succeeded += 1;
            info!("Task '{}' completed.", name);
            let notice = self.settings.task_notice.clone();
            self.publish_warning(&notice, name);
        } else {
            self.report.tasks_failed += 1;
            info!("Task '{}' failed.", name);
        }

        if self.settings.reset_on_done {
            self.reset_episode();
        }
    }

    /// Re-initializes in place and resumes. Downstream nodes follow along.
    fn reset_episode(&mut self) {
        self.report.resets += 1;
        match self.initialize() {
            Ok(()) => {
                self.state = ControlState::Running;
                if self.role == Role::Authoritative {
                    self.publish(&Instruction::Reset);
                }
            }
            Err(e) => {
                // Without a fresh mapping the loop cannot drive anything.
                error!("Reset failed, stopping: {}", e);
                self.state = ControlState::Stopping;
            }
        }
    }

    // --- Outbound ---

    fn publish(&self, instruction: &Instruction) -> usize {
        let payload = wire::encode(instruction);
        let delivered = self.bus.publish(&self.channels.outbound, &payload);
        debug!(
            "Published {} on '{}' to {} subscribers.",
            instruction.kind(),
            self.channels.outbound,
            delivered
        );
        delivered
    }

    fn publish_warning(&mut self, style: &WarningStyle, entity: impl std::fmt::Display) {
        let warning = style.render(entity);
        self.publish(&Instruction::Warning(warning));
        self.report.warnings_sent += 1;
    }
}

impl<A: SimulationAdapter, S: EventSource> Drop for ControlLoop<A, S> {
    fn drop(&mut self) {
        for sub in self.subscriptions.drain(..) {
            sub.unsubscribe();
        }
    }
}
