use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn write_level() -> NamedTempFile {
    let level = r#"<world>
  <materials>
    <material name="stone" file="/lib/std/stone4.gif"/>
  </materials>
  <grids>
    <grid>
      <size>4 4</size>
      <light><position>2 3 2</position><radius>4</radius></light>
      <tile2d material="stone"><start>0 0 0</start><end>4 0 4</end></tile2d>
    </grid>
  </grids>
  <start><position>1.5 0 1.5</position></start>
</world>
"#;
    let mut tmp = NamedTempFile::new().expect("temp level");
    tmp.write_all(level.as_bytes()).expect("write level");
    tmp
}

#[test]
fn cli_prints_level_summary() {
    let level = write_level();
    let mut cmd = Command::cargo_bin("crystal-iso").expect("binary exists");
    cmd.arg(level.path()).arg("--summary-only");
    cmd.assert()
        .success()
        .stdout(contains(
            "Loaded level with 1 grids (1 materials, 1 lights, 16 sprites)",
        ))
        .stdout(contains(" - grid 0 4x4 from (0, 0) to (4, 4), 16 sprites"))
        .stdout(contains(
            " - grid 0: 16 sprites, 1 static lights, 0 dynamic lights",
        ));
}

#[test]
fn cli_renders_frames_and_walks_the_player() {
    let level = write_level();
    let mut cmd = Command::cargo_bin("crystal-iso").expect("binary exists");
    cmd.arg(level.path())
        .arg("--frames")
        .arg("3")
        .arg("--walk")
        .arg("1,0,0");
    cmd.assert()
        .success()
        .stdout(contains("Frame 0: "))
        .stdout(contains("Frame 2: "))
        .stdout(contains(
            " - grid 0: 17 sprites, 1 static lights, 1 dynamic lights",
        ))
        .stdout(contains("Last sprite at (3.50, 0.00, 1.50)"));
}

#[test]
fn cli_reports_blocked_moves() {
    let level = write_level();
    let mut cmd = Command::cargo_bin("crystal-iso").expect("binary exists");
    cmd.arg(level.path())
        .arg("--frames")
        .arg("2")
        .arg("--walk")
        .arg("0,0,10");
    cmd.assert()
        .success()
        .stdout(contains("Player blocked: no grid contains position"))
        .stdout(contains("Last sprite at (1.50, 0.00, 1.50)"));
}

#[test]
fn cli_fails_on_missing_level() {
    let mut cmd = Command::cargo_bin("crystal-iso").expect("binary exists");
    cmd.arg("/nonexistent/level.xml");
    cmd.assert()
        .failure()
        .stderr(contains("failed to read level"));
}
