// Integration tests for the traffic control engine's public API

use std::collections::HashMap;

use traffic_control::simulation::{
    Axis, ControlMode, EngineCommand, EngineError, ErrorKind, GridCoord, IntersectionId,
    LogCategory, SegmentId, SignalPhase, SimConfig, SimEngine, SimId, VehicleId, WeatherState,
};

const DELTA: f32 = 0.1;

/// Engine with no arrivals, for signal-only scenarios
fn quiet_engine(cols: usize, rows: usize) -> SimEngine {
    let config = SimConfig {
        spawn_rate: 0.0,
        seed: Some(1),
        ..SimConfig::with_grid(cols, rows)
    };
    let mut engine = SimEngine::new(config).unwrap();
    engine.set_is_running(true).unwrap();
    engine
}

/// Engine with steady arrivals
fn busy_engine(seed: u64) -> SimEngine {
    let config = SimConfig {
        spawn_rate: 3.0,
        seed: Some(seed),
        ..SimConfig::with_grid(3, 3)
    };
    let mut engine = SimEngine::new(config).unwrap();
    engine.set_is_running(true).unwrap();
    engine
}

fn run(engine: &mut SimEngine, ticks: usize) {
    for _ in 0..ticks {
        engine.tick(DELTA);
    }
}

fn id(n: usize) -> IntersectionId {
    IntersectionId(SimId(n))
}

#[test]
fn test_phases_are_mutually_exclusive() {
    let mut engine = busy_engine(21);
    for step in 0..3000 {
        if step == 800 {
            engine.toggle_emergency(true).unwrap();
        }
        if step == 1200 {
            engine.toggle_emergency(false).unwrap();
        }
        if step % 500 == 0 {
            engine.apply_quantum_optimization().unwrap();
        }

        let snapshot = engine.tick(DELTA);
        for ix in &snapshot.intersections {
            let ns = ix.allows(Axis::NorthSouth);
            let ew = ix.allows(Axis::EastWest);
            assert!(!(ns && ew), "{} lets both axes through in {}", ix.id, ix.phase);
            assert_eq!(ix.phase == SignalPhase::AllRed, !ns && !ew);
            if ix.mode == ControlMode::Auto {
                assert!(ix.phase_elapsed < ix.durations.for_phase(ix.phase));
            }
        }
    }
}

#[test]
fn test_auto_cycle_order() {
    let mut engine = quiet_engine(1, 1);
    let mut seen = vec![engine.snapshot().intersections[0].phase];
    for _ in 0..1200 {
        let phase = engine.tick(DELTA).intersections[0].phase;
        if seen.last() != Some(&phase) {
            seen.push(phase);
        }
    }

    let expected = [
        SignalPhase::NsGreen,
        SignalPhase::NsYellow,
        SignalPhase::AllRed,
        SignalPhase::EwGreen,
        SignalPhase::EwYellow,
        SignalPhase::AllRed,
    ];
    assert!(seen.len() > expected.len());
    for (i, phase) in seen.iter().enumerate() {
        assert_eq!(*phase, expected[i % expected.len()]);
    }
}

#[test]
fn test_vehicle_positions_never_move_backwards() {
    let mut engine = busy_engine(4);
    let mut last: HashMap<VehicleId, (SegmentId, f32)> = HashMap::new();

    for _ in 0..1500 {
        let snapshot = engine.tick(DELTA);
        for vehicle in &snapshot.vehicles {
            assert!((0.0..=1.0).contains(&vehicle.position));
            if let Some((segment, position)) = last.get(&vehicle.id) {
                if *segment == vehicle.segment {
                    assert!(vehicle.position >= *position, "{} moved backwards", vehicle.id);
                }
            }
            last.insert(vehicle.id, (vehicle.segment, vehicle.position));
        }
    }
    assert!(engine.stats().total_spawned > 0);
}

#[test]
fn test_occupancy_matches_vehicles() {
    let mut engine = busy_engine(9);
    for _ in 0..20 {
        run(&mut engine, 50);
        let snapshot = engine.snapshot();

        let mut counts: HashMap<SegmentId, u32> = HashMap::new();
        for vehicle in &snapshot.vehicles {
            *counts.entry(vehicle.segment).or_default() += 1;
        }
        for segment in engine.road_network().segments() {
            assert_eq!(
                segment.occupancy,
                counts.get(&segment.id).copied().unwrap_or(0),
                "occupancy drifted on {}",
                segment.id
            );
        }
    }
}

#[test]
fn test_vehicles_complete_trips() {
    let mut engine = busy_engine(2);
    run(&mut engine, 3000);
    let stats = engine.stats();
    assert!(stats.total_retired > 0);
    assert!(stats.throughput > 0.0);
    assert_eq!(
        stats.total_spawned,
        stats.total_retired + stats.active_vehicles as u64
    );
}

#[test]
fn test_manual_override_holds_phase() {
    let mut engine = quiet_engine(2, 2);
    engine
        .set_light_state_manually(id(0), SignalPhase::EwYellow)
        .unwrap();
    run(&mut engine, 600);

    let snapshot = engine.snapshot();
    let ix = snapshot.intersection(id(0)).unwrap();
    assert_eq!(ix.mode, ControlMode::Manual);
    assert_eq!(ix.phase, SignalPhase::EwYellow);
    assert_eq!(engine.event_log().count(LogCategory::Override), 1);
}

#[test]
fn test_return_to_auto_reenters_at_all_red() {
    let mut engine = quiet_engine(2, 2);
    engine
        .set_light_state_manually(id(1), SignalPhase::EwGreen)
        .unwrap();
    run(&mut engine, 10);

    engine.return_to_auto(id(1)).unwrap();
    let snapshot = engine.tick(DELTA);
    let ix = snapshot.intersection(id(1)).unwrap();
    assert_eq!(ix.mode, ControlMode::Auto);
    assert_eq!(ix.phase, SignalPhase::AllRed);
    assert_eq!(ix.next_green(), Axis::NorthSouth);

    // the cycle carries on from there
    run(&mut engine, 30);
    let snapshot = engine.snapshot();
    assert_eq!(
        snapshot.intersection(id(1)).unwrap().phase,
        SignalPhase::NsGreen
    );
}

#[test]
fn test_emergency_corridor_on_and_off() {
    let mut engine = quiet_engine(3, 3);
    let corridor: Vec<IntersectionId> = (0..3)
        .filter_map(|col| engine.road_network().intersection_at(GridCoord::new(col, 1)))
        .collect();
    assert_eq!(corridor.len(), 3);

    engine.toggle_emergency(true).unwrap();
    run(&mut engine, 500);
    let snapshot = engine.snapshot();
    assert!(snapshot.stats.emergency_active);
    for ix in &snapshot.intersections {
        if corridor.contains(&ix.id) {
            assert_eq!(ix.mode, ControlMode::EmergencyPreempt);
            assert_eq!(ix.phase, SignalPhase::EwGreen);
        } else {
            assert_eq!(ix.mode, ControlMode::Auto);
        }
    }

    engine.toggle_emergency(false).unwrap();
    let snapshot = engine.tick(DELTA);
    assert!(!snapshot.stats.emergency_active);
    for ix_id in &corridor {
        let ix = snapshot.intersection(*ix_id).unwrap();
        assert_eq!(ix.mode, ControlMode::Auto);
        assert_eq!(ix.phase, SignalPhase::AllRed);
        assert_eq!(ix.next_green(), Axis::NorthSouth);
    }
    assert_eq!(engine.event_log().count(LogCategory::Emergency), 2);
}

#[test]
fn test_emergency_flag_mirrored_while_paused() {
    let config = SimConfig {
        seed: Some(8),
        ..SimConfig::with_grid(3, 3)
    };
    let mut engine = SimEngine::new(config).unwrap();

    engine.toggle_emergency(true).unwrap();
    let snapshot = engine.tick(DELTA);
    assert!(!snapshot.is_running);
    let preempted = snapshot
        .intersections
        .iter()
        .filter(|ix| ix.mode == ControlMode::EmergencyPreempt)
        .count();
    assert_eq!(preempted, 3);
    assert!(engine.signals().emergency_active());
    assert!(snapshot.stats.emergency_active);

    engine.toggle_emergency(false).unwrap();
    let snapshot = engine.tick(DELTA);
    assert!(!snapshot.stats.emergency_active);
    assert_eq!(snapshot.tick, 0);
}

#[test]
fn test_repeated_emergency_toggle_is_noop() {
    let mut engine = quiet_engine(2, 2);
    engine.toggle_emergency(true).unwrap();
    engine.toggle_emergency(true).unwrap();
    run(&mut engine, 2);
    assert_eq!(engine.event_log().count(LogCategory::Emergency), 1);
}

#[test]
fn test_manual_phase_waits_for_emergency_release() {
    let mut engine = quiet_engine(3, 3);
    let on_corridor = engine
        .road_network()
        .intersection_at(GridCoord::new(0, 1))
        .unwrap();

    engine.toggle_emergency(true).unwrap();
    run(&mut engine, 1);
    engine
        .set_light_state_manually(on_corridor, SignalPhase::NsGreen)
        .unwrap();
    let snapshot = engine.tick(DELTA);
    let ix = snapshot.intersection(on_corridor).unwrap();
    assert_eq!(ix.mode, ControlMode::EmergencyPreempt);
    assert_eq!(ix.phase, SignalPhase::EwGreen);

    engine.toggle_emergency(false).unwrap();
    let snapshot = engine.tick(DELTA);
    let ix = snapshot.intersection(on_corridor).unwrap();
    assert_eq!(ix.mode, ControlMode::Manual);
    assert_eq!(ix.phase, SignalPhase::NsGreen);
}

#[test]
fn test_optimizer_respects_bounds_and_skips_overrides() {
    let mut engine = busy_engine(13);
    run(&mut engine, 400);

    let manual = id(0);
    engine
        .set_light_state_manually(manual, SignalPhase::AllRed)
        .unwrap();
    engine.toggle_emergency(true).unwrap();
    run(&mut engine, 1);
    let before = engine.snapshot();

    engine.apply_quantum_optimization().unwrap();
    let after = engine.tick(DELTA);

    let config = engine.config();
    let mut skipped = 0;
    for ix in &after.intersections {
        let old = before.intersection(ix.id).unwrap();
        if ix.mode == ControlMode::Auto {
            assert!(ix
                .durations
                .greens_within(config.green_floor_secs, config.green_ceiling_secs));
        } else {
            assert_eq!(ix.durations, old.durations, "{} was retuned", ix.id);
            skipped += 1;
        }
    }
    // I0 plus the three corridor intersections
    assert_eq!(skipped, 4);

    let skip_entries: Vec<_> = after
        .logs
        .iter()
        .filter(|e| e.category == LogCategory::Optimization && e.message.starts_with("Skipped"))
        .collect();
    assert_eq!(skip_entries.len(), skipped);
    assert!(skip_entries.iter().any(|e| e.message == "Skipped I0 (MANUAL)"));
}

#[test]
fn test_empty_network_tick() {
    let mut engine = quiet_engine(2, 2);
    run(&mut engine, 50);

    let snapshot = engine.snapshot();
    assert!(snapshot.vehicles.is_empty());
    assert!(snapshot.jammed_segments.is_empty());
    assert_eq!(snapshot.stats.overall_density, 0.0);
    assert_eq!(snapshot.stats.throughput, 0.0);
    assert_eq!(snapshot.stats.average_wait_time, 0.0);
    assert_eq!(snapshot.tick, 50);
    assert!((snapshot.time - 5.0).abs() < 1e-3);
}

#[test]
fn test_paused_engine_does_not_advance() {
    let config = SimConfig {
        seed: Some(5),
        ..SimConfig::default()
    };
    let mut engine = SimEngine::new(config).unwrap();
    run(&mut engine, 100);

    let snapshot = engine.snapshot();
    assert!(!snapshot.is_running);
    assert_eq!(snapshot.tick, 0);
    assert_eq!(snapshot.time, 0.0);
    assert!(snapshot.vehicles.is_empty());
}

#[test]
fn test_negative_speed_rejected() {
    let mut engine = quiet_engine(2, 2);
    engine.set_simulation_speed(2.0).unwrap();
    run(&mut engine, 1);

    let err = engine.set_simulation_speed(-1.0).unwrap_err();
    assert_eq!(err, EngineError::InvalidSpeed(-1.0));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(engine.set_simulation_speed(0.0).is_err());
    assert!(engine.set_simulation_speed(f32::NAN).is_err());

    let snapshot = engine.tick(DELTA);
    assert_eq!(snapshot.simulation_speed, 2.0);
    assert_eq!(snapshot.pending_commands, 0);
}

#[test]
fn test_speed_scales_simulated_time() {
    let mut engine = quiet_engine(1, 1);
    engine.set_simulation_speed(4.0).unwrap();
    run(&mut engine, 10);
    assert!((engine.time() - 4.0).abs() < 1e-3);
}

#[test]
fn test_unknown_intersection_rejected() {
    let mut engine = quiet_engine(2, 2);
    let missing = id(999);
    assert_eq!(
        engine.set_light_state_manually(missing, SignalPhase::NsGreen),
        Err(EngineError::UnknownIntersection(missing))
    );
    assert_eq!(
        engine.submit(EngineCommand::ReturnToAuto(missing)),
        Err(EngineError::UnknownIntersection(missing))
    );

    let snapshot = engine.tick(DELTA);
    assert!(snapshot
        .intersections
        .iter()
        .all(|ix| ix.mode == ControlMode::Auto));
}

#[test]
fn test_invalid_phase_string() {
    let err = "PURPLE".parse::<SignalPhase>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!("ew_yellow".parse::<SignalPhase>(), Ok(SignalPhase::EwYellow));
    assert_eq!(" ALL_RED ".parse::<SignalPhase>(), Ok(SignalPhase::AllRed));
}

#[test]
fn test_weather_lowers_speed_limits() {
    let mut engine = quiet_engine(2, 2);
    engine.set_weather(WeatherState::Snow).unwrap();
    let snapshot = engine.tick(DELTA);
    assert_eq!(snapshot.weather, WeatherState::Snow);
    for segment in engine.road_network().segments() {
        assert!((segment.speed_limit - segment.base_speed_limit * 0.5).abs() < 1e-6);
    }

    engine.set_weather(WeatherState::Clear).unwrap();
    engine.tick(DELTA);
    for segment in engine.road_network().segments() {
        assert_eq!(segment.speed_limit, segment.base_speed_limit);
    }
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let mut a = busy_engine(77);
    let mut b = busy_engine(77);
    for step in 0..1200 {
        if step == 600 {
            a.apply_quantum_optimization().unwrap();
            b.apply_quantum_optimization().unwrap();
        }
        a.tick(DELTA);
        b.tick(DELTA);
    }

    let (sa, sb) = (a.snapshot(), b.snapshot());
    assert_eq!(sa.stats, sb.stats);
    assert_eq!(sa.vehicles.len(), sb.vehicles.len());
    for (va, vb) in sa.vehicles.iter().zip(&sb.vehicles) {
        assert_eq!(va.id, vb.id);
        assert_eq!(va.segment, vb.segment);
        assert_eq!(va.position, vb.position);
    }
    for (ia, ib) in sa.intersections.iter().zip(&sb.intersections) {
        assert_eq!(ia.phase, ib.phase);
        assert_eq!(ia.durations, ib.durations);
    }
    assert_eq!(sa.logs, sb.logs);
}

#[test]
fn test_event_log_is_bounded() {
    let config = SimConfig {
        log_capacity: 5,
        spawn_rate: 0.0,
        ..SimConfig::with_grid(2, 2)
    };
    let mut engine = SimEngine::new(config).unwrap();
    for i in 0..20 {
        let weather = if i % 2 == 0 {
            WeatherState::Rain
        } else {
            WeatherState::Clear
        };
        engine.set_weather(weather).unwrap();
        engine.tick(DELTA);
    }

    assert_eq!(engine.event_log().len(), 5);
    assert_eq!(engine.event_log().total_pushed(), 21);
    let snapshot = engine.snapshot();
    assert_eq!(snapshot.logs.len(), 5);
    assert_eq!(snapshot.logs.last().unwrap().message, "Weather changed to CLEAR");
}

#[test]
fn test_invalid_config_rejected() {
    let config = SimConfig {
        green_floor_secs: 30.0,
        green_ceiling_secs: 10.0,
        ..SimConfig::default()
    };
    let err = SimEngine::new(config).err().unwrap();
    assert!(matches!(err, EngineError::InvalidConfig(_)));
}
