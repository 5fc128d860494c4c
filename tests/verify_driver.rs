use std::{
  cell::Cell,
  path::{Path, PathBuf},
};

use image::RgbImage;
use ringsight::{
  detector::YoloDetection,
  driver::{Outcome, SmokeTest},
  frame::RgbNhwcFrame,
  model::{DetectItem, DetectResult, Model},
};
use tempfile::TempDir;

#[derive(Debug, thiserror::Error)]
#[error("engine fault: {0}")]
struct EngineFault(String);

enum Behaviour {
  Groups(Vec<DetectResult>),
  Fail(&'static str),
  Panic(&'static str),
}

struct FakeEngine {
  behaviour: Behaviour,
}

impl Model for FakeEngine {
  type Input = RgbNhwcFrame;
  type Output = Vec<DetectResult>;
  type Error = EngineFault;

  fn infer(&self, _input: &RgbNhwcFrame) -> Result<Self::Output, Self::Error> {
    match &self.behaviour {
      Behaviour::Groups(groups) => Ok(groups.clone()),
      Behaviour::Fail(msg) => Err(EngineFault(msg.to_string())),
      Behaviour::Panic(msg) => panic!("{}", msg),
    }
  }
}

struct Workspace {
  _dir: TempDir,
  model: PathBuf,
  image: PathBuf,
}

fn workspace() -> Workspace {
  let dir = tempfile::tempdir().unwrap();
  let model = dir.path().join("best 1.onnx");
  std::fs::write(&model, b"opaque model bytes").unwrap();
  let image = dir.path().join("frame0.png");
  RgbImage::new(64, 48).save(&image).unwrap();
  Workspace {
    _dir: dir,
    model,
    image,
  }
}

fn run_with(smoke: &SmokeTest, behaviour: Behaviour) -> (Outcome, String, bool) {
  let loaded = Cell::new(false);
  let mut out = Vec::new();
  let outcome = smoke
    .run(
      |path: &Path| {
        loaded.set(true);
        assert_eq!(path, smoke.model_path());
        Ok(YoloDetection::new(FakeEngine { behaviour }))
      },
      &mut out,
    )
    .unwrap();
  (outcome, String::from_utf8(out).unwrap(), loaded.get())
}

fn single(score: f32, bbox: [f32; 4]) -> Vec<DetectResult> {
  vec![DetectResult::from(vec![DetectItem {
    class_id: 0,
    score,
    bbox,
  }])]
}

#[test]
fn missing_model_is_reported_and_nothing_else_runs() {
  let ws = workspace();
  let missing = ws.model.with_file_name("absent.onnx");
  let smoke = SmokeTest::new(&missing, &ws.image);

  let (outcome, report, loaded) = run_with(&smoke, Behaviour::Groups(vec![]));

  assert_eq!(outcome, Outcome::ModelMissing);
  assert!(!loaded);
  assert_eq!(
    report,
    format!("Error: Model not found at {}\n", missing.display())
  );
}

#[test]
fn missing_image_is_reported() {
  let ws = workspace();
  let missing = ws.image.with_file_name("frame9.png");
  let smoke = SmokeTest::new(&ws.model, &missing);

  let (outcome, report, loaded) = run_with(&smoke, Behaviour::Groups(vec![]));

  assert_eq!(outcome, Outcome::ImageMissing);
  assert!(!loaded);
  assert!(report.contains("Image not found"));
  assert!(report.contains(&missing.display().to_string()));
}

#[test]
fn undecodable_image_stops_before_loading_the_model() {
  let ws = workspace();
  std::fs::write(&ws.image, b"not a png at all").unwrap();
  let smoke = SmokeTest::new(&ws.model, &ws.image);

  let (outcome, report, loaded) = run_with(&smoke, Behaviour::Groups(vec![]));

  assert_eq!(outcome, Outcome::DecodeFailed);
  assert!(!loaded);
  assert!(report.contains("Failed to load image"));
}

#[test]
fn single_detection_prints_origin_extent_box() {
  let ws = workspace();
  let smoke = SmokeTest::new(&ws.model, &ws.image);

  let (outcome, report, loaded) = run_with(
    &smoke,
    Behaviour::Groups(single(0.87, [5.0, 5.0, 55.0, 105.0])),
  );

  assert!(loaded);
  match outcome {
    Outcome::Detected(best) => {
      assert_eq!(best.rect.to_array(), [5, 5, 50, 100]);
      assert_eq!(best.confidence, 0.87);
    }
    other => panic!("unexpected outcome {:?}", other),
  }
  assert!(report.contains("Detection Successful! Bounding Box: [5,5,50,100]"));
  assert!(report.contains("Format: [x, y, w, h]"));
  assert!(report.contains(&format!("Model: {}", ws.model.display())));
}

#[test]
fn no_detection_is_not_a_failure() {
  let ws = workspace();
  let smoke = SmokeTest::new(&ws.model, &ws.image);

  let (outcome, report, _) = run_with(
    &smoke,
    Behaviour::Groups(vec![DetectResult::default()]),
  );

  assert_eq!(outcome, Outcome::NoDetection);
  assert!(report.contains("No detection found"));
  assert!(report.contains("But the code pipeline executed successfully."));
  assert!(!report.contains("Exception occurred"));
}

#[test]
fn engine_fault_is_caught_and_printed() {
  let ws = workspace();
  let smoke = SmokeTest::new(&ws.model, &ws.image);

  let (outcome, report, _) = run_with(&smoke, Behaviour::Fail("tensor shape mismatch"));

  assert_eq!(
    outcome,
    Outcome::Fault("engine fault: tensor shape mismatch".to_string())
  );
  assert!(report.contains("Exception occurred: engine fault: tensor shape mismatch"));
  assert!(!report.contains("Detection Successful"));
}

fn trace_after_message(report: &str) -> Vec<&str> {
  report
    .lines()
    .skip_while(|line| !line.starts_with("Exception occurred"))
    .skip_while(|line| *line != "stack backtrace:")
    .skip(1)
    .filter(|line| !line.trim().is_empty())
    .collect()
}

#[test]
fn engine_fault_report_carries_a_backtrace() {
  let ws = workspace();
  let smoke = SmokeTest::new(&ws.model, &ws.image);

  let (_, report, _) = run_with(&smoke, Behaviour::Fail("boom"));

  assert!(report.contains("stack backtrace:"));
  assert!(!trace_after_message(&report).is_empty());
}

#[test]
fn engine_panic_report_carries_a_backtrace() {
  let ws = workspace();
  let smoke = SmokeTest::new(&ws.model, &ws.image);

  let (_, report, _) = run_with(&smoke, Behaviour::Panic("boom"));

  assert!(report.contains("Exception occurred: inference engine panicked: boom"));
  assert!(!trace_after_message(&report).is_empty());
}

#[test]
fn engine_panic_is_caught_and_printed() {
  let ws = workspace();
  let smoke = SmokeTest::new(&ws.model, &ws.image);

  let (outcome, report, _) = run_with(&smoke, Behaviour::Panic("runtime exploded"));

  assert!(matches!(outcome, Outcome::Fault(ref msg) if msg.contains("runtime exploded")));
  assert!(report.contains("Exception occurred"));
}

#[test]
fn model_load_failure_is_caught() {
  let ws = workspace();
  let smoke = SmokeTest::new(&ws.model, &ws.image);

  let mut out = Vec::new();
  let outcome = smoke
    .run(
      |path: &Path| -> anyhow::Result<YoloDetection<FakeEngine>> {
        Err(anyhow::anyhow!("cannot parse {}", path.display()))
      },
      &mut out,
    )
    .unwrap();

  assert!(matches!(outcome, Outcome::Fault(_)));
  let report = String::from_utf8(out).unwrap();
  assert!(report.contains("Exception occurred: cannot parse"));
}

#[test]
fn onnx_loader_reports_unparseable_model_as_fault() {
  let ws = workspace();
  let smoke = SmokeTest::new(&ws.model, &ws.image);

  let mut out = Vec::new();
  let outcome = smoke
    .run(
      |path: &Path| {
        Ok(YoloDetection::<ringsight::model::YoloOnnx<RgbNhwcFrame>>::from_path(path)?)
      },
      &mut out,
    )
    .unwrap();

  assert!(matches!(outcome, Outcome::Fault(_)));
  let report = String::from_utf8(out).unwrap();
  assert!(report.contains("Exception occurred"));
}
