// tether_sim/tests/control_loop.rs

mod common;

use common::*;
use nalgebra::Vector3;
use tether_sim::prelude::*;

#[test]
fn gripper_event_yields_only_a_gripper_command() {
    let bus = new_bus();
    let source = ScriptedSource::new(Role::Authoritative, &[1, 2]).then(vec![event(
        1,
        Category::Gripper,
        at(0.0, 0.0, 1.0),
        0.7,
    )]);
    let mut control = running(adapter(), source, &bus, settings());

    assert_eq!(control.tick(), ControlState::Running);
    assert_eq!(control.adapter().writes(), vec![Call::Grip(BodyId(10), 0.7)]);
    assert_eq!(control.report().applied, 1);
}

#[test]
fn unmapped_controller_is_ignored() {
    let bus = new_bus();
    // Controller 2 has nothing: the only gripper went to controller 1.
    let source = ScriptedSource::new(Role::Authoritative, &[1, 2]).then(vec![event(
        2,
        Category::Gripper,
        at(0.0, 0.0, 1.0),
        1.0,
    )]);
    let mut control = running(adapter(), source, &bus, settings());

    control.tick();
    assert!(control.adapter().writes().is_empty());
    assert_eq!(control.report().unmapped, 1);
}

#[test]
fn shutdown_wins_over_queued_traffic() {
    let bus = new_bus();
    let (_state, seen) = collect(&bus, STATE);
    let mut control = running(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1]),
        &bus,
        settings(),
    );

    bus.publish(COMMANDS, br#"{"5": [[1, 0, 0], [0, 0, 0, 1]]}"#);
    bus.publish(COMMANDS, b"0");
    bus.publish(COMMANDS, b"1");
    assert!(bus.settle(WAIT));

    assert_eq!(control.tick(), ControlState::Stopping);
    assert!(control.adapter().writes().is_empty());
    assert_eq!(control.adapter().count(|c| *c == Call::Step), 0);
    assert_eq!(control.report().resets, 0);

    // Further ticks do nothing.
    assert_eq!(control.tick(), ControlState::Stopping);
    assert_eq!(control.report().ticks, 0);

    control.shut_down();
    assert_eq!(control.state(), ControlState::ShutDown);
    assert!(bus.settle(WAIT));
    assert_eq!(seen.lock().unwrap().last(), Some(&Instruction::Shutdown));
    assert_eq!(bus.subscriber_count(COMMANDS), 0);
}

#[test]
fn remote_pose_update_repositions_body_once() {
    let bus = new_bus();
    let mut control = running(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1]),
        &bus,
        settings(),
    );

    bus.publish(COMMANDS, br#"{"5": [[1, 0, 0], [0, 0, 0, 1]]}"#);
    assert!(bus.settle(WAIT));
    control.tick();
    control.tick();

    let moved = |c: &Call| {
        matches!(c, Call::SetPose(BodyId(5), pose) if pose.position == Vector3::new(1.0, 0.0, 0.0))
    };
    assert_eq!(control.adapter().count(moved), 1);
    assert_eq!(control.adapter().writes().len(), 1);
    assert_eq!(control.report().remote_updates, 1);
}

#[test]
fn remote_gripper_update_drags_its_arm() {
    let bus = new_bus();
    let mut control = running(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1]),
        &bus,
        settings(),
    );

    bus.publish(COMMANDS, br#"{"10": [[0, 0, 2], [0, 0, 0, 1]]}"#);
    assert!(bus.settle(WAIT));
    control.tick();

    assert_eq!(
        control.adapter().writes(),
        vec![Call::MoveConstraint(
            ConstraintId(1),
            at(0.0, 0.0, 2.0),
            DEFAULT_FORCE_CEILING
        )]
    );
}

#[test]
fn remote_commands_apply_after_local_events() {
    let bus = new_bus();
    let source = ScriptedSource::new(Role::Authoritative, &[1]).then(vec![event(
        1,
        Category::ArmConstraint,
        at(0.0, 0.0, 1.5),
        100.0,
    )]);
    let mut control = running(adapter(), source, &bus, settings());

    bus.publish(COMMANDS, br#"{"10": [[0, 0, 2], [0, 0, 0, 1]]}"#);
    assert!(bus.settle(WAIT));
    control.tick();

    let writes = control.adapter().writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(
        writes[0],
        Call::MoveConstraint(ConstraintId(1), at(0.0, 0.0, 1.5), 100.0)
    );
    assert_eq!(
        writes[1],
        Call::MoveConstraint(ConstraintId(1), at(0.0, 0.0, 2.0), DEFAULT_FORCE_CEILING)
    );
}

#[test]
fn flipped_arm_command_is_refused_with_warning() {
    let bus = new_bus();
    let (_state, seen) = collect(&bus, STATE);
    let source = ScriptedSource::new(Role::Authoritative, &[1]).then(vec![event(
        1,
        Category::ArmConstraint,
        flipped(0.0, 0.0, 1.0),
        0.0,
    )]);
    let mut control = running(
        adapter(),
        source,
        &bus,
        LoopSettings {
            monitor: tilt_guard(),
            ..settings()
        },
    );

    assert_eq!(control.tick(), ControlState::Running);
    assert!(bus.settle(WAIT));

    assert_eq!(
        control.adapter().count(|c| matches!(c, Call::MoveConstraint(..))),
        0
    );
    let warnings = warnings(&seen);
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].text,
        "Warning: you are flipping arm link 1. Positions reset"
    );
    assert_eq!(warnings[0].color, [255, 0, 0]);
    assert_eq!(control.report().violations, 1);
}

#[test]
fn arm_link_audit_reverts_to_last_good_pose() {
    let bus = new_bus();
    let (_state, seen) = collect(&bus, STATE);
    let mut control = running(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1]),
        &bus,
        LoopSettings {
            monitor: tilt_guard(),
            ..settings()
        },
    );

    control.tick();
    control
        .adapter_mut()
        .bodies
        .insert(BodyId(11), flipped(0.0, 0.0, 1.0));
    control.tick();
    assert!(bus.settle(WAIT));

    assert_eq!(control.adapter().bodies[&BodyId(11)], at(0.0, 0.0, 1.0));
    assert_eq!(
        control
            .adapter()
            .count(|c| *c == Call::SetPose(BodyId(11), at(0.0, 0.0, 1.0))),
        1
    );
    let warnings = warnings(&seen);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].text.contains("arm link 11"));
    assert_eq!(control.report().violations, 1);
}

#[test]
fn primary_controller_wins_shared_entity() {
    let bus = new_bus();
    let both = || {
        vec![
            event(1, Category::ArmConstraint, at(0.0, 0.0, 1.0), 0.0),
            event(2, Category::ArmConstraint, at(0.0, 0.0, 1.2), 0.0),
        ]
    };
    let source = ScriptedSource::new(Role::Authoritative, &[1, 2])
        .then(both())
        .then(both())
        .then(both());
    let mut control = running(
        adapter(),
        source,
        &bus,
        LoopSettings {
            redundancy: RedundancyPolicy::Primary(ControllerId(2)),
            ..settings()
        },
    );
    control.reassign(Category::ArmConstraint, ControllerId(2), EntityId(1));
    assert_eq!(control.primary(), Some(ControllerId(2)));

    for _ in 0..3 {
        control.tick();
    }

    let moves = control.adapter().writes();
    assert_eq!(moves.len(), 3);
    for call in moves {
        assert!(matches!(
            call,
            Call::MoveConstraint(ConstraintId(1), pose, _) if pose.position.z == 1.2
        ));
    }
    assert_eq!(control.report().suppressed, 3);
}

#[test]
fn reset_rebuilds_mapping() {
    let bus = new_bus();
    let (_state, seen) = collect(&bus, STATE);
    let mut control = running(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1, 2]),
        &bus,
        settings(),
    );
    assert_eq!(
        control.mapping().get(Category::Gripper, ControllerId(1)),
        Some(EntityId(10))
    );

    control.source_mut().controllers = vec![ControllerId(2), ControllerId(1)];
    bus.publish(COMMANDS, b"1");
    assert!(bus.settle(WAIT));

    assert_eq!(control.tick(), ControlState::Running);
    assert_eq!(
        control.mapping().get(Category::Gripper, ControllerId(2)),
        Some(EntityId(10))
    );
    assert_eq!(control.mapping().get(Category::Gripper, ControllerId(1)), None);
    assert_eq!(control.adapter().count(|c| *c == Call::Reset), 2);
    assert_eq!(control.report().resets, 1);

    assert!(bus.settle(WAIT));
    assert!(seen.lock().unwrap().contains(&Instruction::Reset));
}

#[test]
fn adapter_errors_do_not_stop_the_loop() {
    let bus = new_bus();
    let source = ScriptedSource::new(Role::Authoritative, &[1])
        .then(vec![event(1, Category::Gripper, at(0.0, 0.0, 1.0), 0.5)])
        .then(vec![event(1, Category::Gripper, at(0.0, 0.0, 1.0), 0.5)]);
    let mut adapter = adapter();
    adapter.fail_writes = true;
    let mut control = running(adapter, source, &bus, settings());

    assert_eq!(control.tick(), ControlState::Running);
    assert_eq!(control.tick(), ControlState::Running);
    let report = control.report();
    assert_eq!(report.adapter_errors, 2);
    assert_eq!(report.applied, 0);
    assert_eq!(report.ticks, 2);
    assert_eq!(control.adapter().count(|c| *c == Call::Step), 2);
}

#[test]
fn malformed_messages_are_dropped_and_counted() {
    let bus = new_bus();
    let mut control = running(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1]),
        &bus,
        settings(),
    );

    bus.publish(COMMANDS, b"print('hi')");
    bus.publish(COMMANDS, b"[1, 2]");
    bus.publish(COMMANDS, b"3");
    assert!(bus.settle(WAIT));

    assert_eq!(control.tick(), ControlState::Running);
    assert_eq!(control.report().malformed, 3);
    assert!(control.adapter().writes().is_empty());
}

#[test]
fn run_stops_at_tick_limit_and_broadcasts() {
    let bus = new_bus();
    let (_state, seen) = collect(&bus, STATE);
    let mut control = ControlLoop::new(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1]),
        bus.clone(),
        LoopSettings {
            max_ticks: Some(6),
            broadcast_every: 2,
            ..settings()
        },
    );

    let report = control.run().unwrap();
    assert_eq!(report.ticks, 6);
    assert_eq!(report.broadcasts, 3);
    assert_eq!(control.state(), ControlState::ShutDown);

    assert!(bus.settle(WAIT));
    let seen = seen.lock().unwrap();
    let snapshots = seen
        .iter()
        .filter(|i| matches!(i, Instruction::PoseUpdate(s) if s.len() == 3))
        .count();
    assert_eq!(snapshots, 3);
    assert_eq!(seen.last(), Some(&Instruction::Shutdown));
}

#[test]
fn start_requires_initialize() {
    let bus = new_bus();
    let mut control = ControlLoop::new(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1]),
        bus,
        settings(),
    );
    assert!(matches!(
        control.start(),
        Err(LoopError::InvalidState { .. })
    ));
    assert_eq!(control.tick(), ControlState::Uninitialized);
}

struct SucceedOnce(bool);

impl TaskChecker for SucceedOnce {
    fn name(&self) -> &str {
        "once"
    }

    fn check(&mut self, _: &Snapshot) -> TaskStatus {
        let done = !self.0;
        self.0 = true;
        TaskStatus { done, success: done }
    }
}

#[test]
fn task_success_publishes_notice_and_resets() {
    let bus = new_bus();
    let (_state, seen) = collect(&bus, STATE);
    let mut control = ControlLoop::new(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1]),
        bus.clone(),
        settings(),
    )
    .with_task(Box::new(SucceedOnce(false)));
    control.initialize().unwrap();
    control.start().unwrap();

    control.tick();
    control.tick();
    assert!(bus.settle(WAIT));

    let report = control.report();
    assert_eq!(report.tasks_succeeded, 1);
    assert_eq!(report.resets, 1);
    let warnings = warnings(&seen);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].text, "Good job! You completed one piece of task");
    assert_eq!(warnings[0].duration, 5.0);
    assert!(seen.lock().unwrap().contains(&Instruction::Reset));
}

#[test]
fn observer_mirrors_and_sends_heartbeats() {
    let bus = new_bus();
    let (_heartbeat, heartbeats) = collect(&bus, HEARTBEAT);

    let mut observer = running(
        RecordingAdapter::with_bodies(&[5, 10, 11]),
        ScriptedSource::new(Role::Observer, &[]),
        &bus,
        settings(),
    );
    assert_eq!(observer.inbound_channel(), COMMANDS);
    assert_eq!(observer.mirror_channel(), Some(STATE));
    assert_eq!(observer.outbound_channel(), HEARTBEAT);

    // The upstream world starts (and resets) with body 5 elsewhere.
    let mut upstream = adapter();
    upstream.initial.insert(BodyId(5), at(3.0, 0.0, 0.0));
    upstream.bodies.insert(BodyId(5), at(3.0, 0.0, 0.0));
    let mut authority = running(
        upstream,
        ScriptedSource::new(Role::Authoritative, &[1]),
        &bus,
        settings(),
    );

    authority.tick();
    assert!(bus.settle(WAIT));
    observer.tick();
    assert!(bus.settle(WAIT));

    assert_eq!(observer.adapter().bodies[&BodyId(5)], at(3.0, 0.0, 0.0));
    assert!(observer.report().received >= 1);
    assert!(heartbeats
        .lock()
        .unwrap()
        .iter()
        .any(|i| matches!(i, Instruction::PoseUpdate(s) if s.get(BodyId(5)) == Some(&at(3.0, 0.0, 0.0)))));

    authority.shut_down();
    assert!(bus.settle(WAIT));
    assert_eq!(observer.tick(), ControlState::Stopping);
    observer.shut_down();
    assert!(bus.settle(WAIT));
    assert!(!heartbeats.lock().unwrap().contains(&Instruction::Shutdown));
}

#[test]
fn observer_obeys_the_command_channel() {
    let bus = new_bus();
    let mut observer = running(
        RecordingAdapter::with_bodies(&[5, 10, 11]),
        ScriptedSource::new(Role::Observer, &[]),
        &bus,
        settings(),
    );

    bus.publish(COMMANDS, br#"{"5": [[2, 0, 0], [0, 0, 0, 1]]}"#);
    assert!(bus.settle(WAIT));
    assert_eq!(observer.tick(), ControlState::Running);
    assert_eq!(observer.adapter().bodies[&BodyId(5)], at(2.0, 0.0, 0.0));

    assert_eq!(bus.publish(COMMANDS, b"0"), 1);
    assert!(bus.settle(WAIT));
    assert_eq!(observer.tick(), ControlState::Stopping);
}

#[test]
fn idle_primary_still_suppresses_secondary() {
    let bus = new_bus();
    let source = ScriptedSource::new(Role::Authoritative, &[1, 2]).then(vec![event(
        2,
        Category::ArmConstraint,
        at(0.0, 0.0, 1.2),
        0.0,
    )]);
    let mut control = running(
        adapter(),
        source,
        &bus,
        LoopSettings {
            redundancy: RedundancyPolicy::Primary(ControllerId(1)),
            ..settings()
        },
    );
    control.reassign(Category::ArmConstraint, ControllerId(2), EntityId(1));

    control.tick();
    assert!(control.adapter().writes().is_empty());
    assert_eq!(control.report().suppressed, 1);
}

#[test]
fn remote_update_flipping_an_arm_link_is_refused() {
    let bus = new_bus();
    let (_state, seen) = collect(&bus, STATE);
    let mut control = running(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1]),
        &bus,
        LoopSettings {
            monitor: tilt_guard(),
            ..settings()
        },
    );

    // Half a turn about x, xyzw.
    bus.publish(COMMANDS, br#"{"11": [[0, 0, 1], [1, 0, 0, 0]]}"#);
    assert!(bus.settle(WAIT));
    control.tick();
    assert!(bus.settle(WAIT));

    assert_eq!(
        control
            .adapter()
            .count(|c| matches!(c, Call::SetPose(BodyId(11), _))),
        0
    );
    assert_eq!(control.adapter().bodies[&BodyId(11)], at(0.0, 0.0, 1.0));
    let warnings = warnings(&seen);
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0].text,
        "Warning: you are flipping arm link 11. Positions reset"
    );
    assert_eq!(control.report().violations, 1);
}

#[test]
fn unlistable_world_skips_the_broadcast() {
    let bus = new_bus();
    let (_state, seen) = collect(&bus, STATE);
    let mut control = running(
        adapter(),
        ScriptedSource::new(Role::Authoritative, &[1]),
        &bus,
        settings(),
    )
    .with_task(Box::new(SucceedOnce(false)));

    control.adapter_mut().fail_listing = true;
    assert_eq!(control.tick(), ControlState::Running);
    assert!(bus.settle(WAIT));

    let report = control.report();
    assert_eq!(report.broadcasts, 0);
    assert_eq!(report.adapter_errors, 1);
    assert_eq!(report.tasks_succeeded, 0);
    assert!(seen.lock().unwrap().is_empty());

    control.adapter_mut().fail_listing = false;
    control.tick();
    assert_eq!(control.report().broadcasts, 1);
}
