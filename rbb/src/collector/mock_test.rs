use super::*;

fn run(collector: &mut MockCollector, ticks: usize) -> Vec<(Option<InjectedFailure>, TelemetryData)> {
    (0..ticks)
        .map(|_| {
            let data = collector.snapshot().unwrap();
            (collector.active_failure(), data)
        })
        .collect()
}

#[test]
fn snapshot_has_six_joints_and_all_sections() {
    let mut collector = MockCollector::with_seed(7);
    let data = collector.snapshot().unwrap();
    let joints = data.joints.as_ref().unwrap();
    assert_eq!(joints.positions_rad.len(), 6);
    assert_eq!(joints.velocities_rad_s.len(), 6);
    assert_eq!(joints.torques_nm.len(), 6);
    assert_eq!(joints.temperatures_c.len(), 6);
    assert!(data.gripper.is_some());
    assert_eq!(data.task_phase(), Some("reaching"));
    assert!(data.system.unwrap().timestamp_robot.is_some());
}

#[test]
fn healthy_samples_stay_in_normal_ranges() {
    let mut collector = MockCollector::with_seed(11);
    for (active, data) in run(&mut collector, 400) {
        if active.is_some() {
            continue;
        }
        let joints = data.joints.unwrap();
        for position in &joints.positions_rad {
            let position = position.unwrap();
            assert!(position.abs() <= FRAC_PI_4 + 1e-9);
        }
        let confidence = data.model.unwrap().action_confidence.unwrap();
        assert!((0.75..0.99).contains(&confidence));
        let gripper = data.gripper.unwrap().position_mm.unwrap();
        assert!((20.0..=80.0).contains(&gripper));
    }
}

#[test]
fn task_phase_cycles_every_thirty_ticks() {
    let mut collector = MockCollector::with_seed(3);
    let phases = run(&mut collector, 150)
        .into_iter()
        .map(|(_, data)| data.task.unwrap().phase.unwrap())
        .collect::<Vec<_>>();
    // tick n is phases[n - 1]
    assert_eq!(phases[0], "reaching");
    assert_eq!(phases[29], "grasping");
    assert_eq!(phases[59], "lifting");
    assert_eq!(phases[89], "placing");
    assert_eq!(phases[119], "returning");
    assert_eq!(phases[149], "reaching");
}

#[test]
fn battery_drains_linearly() {
    let mut collector = MockCollector::with_seed(5);
    let samples = run(&mut collector, 100);
    let first = samples[0].1.battery_percent().unwrap();
    let last = samples[99].1.battery_percent().unwrap();
    assert!((first - 99.99).abs() < 1e-9);
    assert!((last - 99.0).abs() < 1e-9);
}

#[test]
fn failures_are_injected_and_visible_in_the_data() {
    let mut collector = MockCollector::with_seed(42);
    let samples = run(&mut collector, 2000);

    let first_failure = samples.iter().position(|(active, _)| active.is_some()).unwrap();
    assert!((49..200).contains(&first_failure), "first injection at tick {}", first_failure + 1);

    for (active, data) in &samples {
        let joints = data.joints.as_ref().unwrap();
        match active {
            Some(InjectedFailure::SensorDropout) => {
                assert_eq!(joints.positions_rad.iter().filter(|p| p.is_none()).count(), 1);
            }
            Some(InjectedFailure::MotorOverload) => {
                assert!(joints.torques_nm.iter().flatten().any(|t| *t >= 30.0));
            }
            Some(InjectedFailure::ModelLowConfidence) => {
                let confidence = data.model_confidence().unwrap();
                assert!((0.15..0.40).contains(&confidence));
            }
            None => assert!(joints.positions_rad.iter().all(Option::is_some)),
        }
    }
}

#[test]
fn injections_last_between_five_and_twenty_ticks() {
    let mut collector = MockCollector::with_seed(9);
    let samples = run(&mut collector, 3000);

    let mut runs = Vec::new();
    let mut current = 0;
    for (active, _) in &samples {
        if active.is_some() {
            current += 1;
        } else if current > 0 {
            runs.push(current);
            current = 0;
        }
    }
    assert!(!runs.is_empty());
    // The tick that starts an injection counts, the one that ends it does not.
    assert!(runs.iter().all(|len| (5..=20).contains(len)), "runs: {runs:?}");
}

#[test]
fn temperature_noise_matches_its_distribution() {
    let mut collector = MockCollector::with_seed(3);
    let samples = (0..4000).map(|_| collector.gauss(35.0, 2.0)).collect::<Vec<_>>();
    #[allow(clippy::cast_precision_loss)]
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let std_dev = (samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
    assert!((mean - 35.0).abs() < 0.2, "mean {mean}");
    assert!((std_dev - 2.0).abs() < 0.2, "std dev {std_dev}");
}

#[test]
fn invalid_noise_width_yields_the_mean() {
    let mut collector = MockCollector::with_seed(3);
    assert!((collector.gauss(5.0, f64::NAN) - 5.0).abs() < f64::EPSILON);
    assert!((collector.gauss(5.0, -1.0) - 5.0).abs() < f64::EPSILON);
}
