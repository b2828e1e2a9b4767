// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the CLI specs.

use std::path::{Path, PathBuf};

/// The structured planning response every spec engine returns.
pub const PLAN_BODY: &str = "<ANALYSIS>ok</ANALYSIS>\\n<PLAN>\\n1. do\\n</PLAN>\\n<FILES>\\nsrc/out.txt\\n</FILES>\\n<OPTIMIZATION>o</OPTIMIZATION>";

/// Write an executable fake engine that consumes stdin and prints the
/// given stdout lines, then exits with `code`.
pub fn fake_engine(dir: &Path, lines: &[&str], code: i32) -> PathBuf {
    let path = dir.join("engine.sh");
    let mut script = String::from("#!/bin/sh\ncat > /dev/null\n");
    for line in lines {
        script.push_str(&format!("printf '%s\\n' '{line}'\n"));
    }
    script.push_str(&format!("exit {code}\n"));
    std::fs::write(&path, script).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// A fake engine that answers every call with a valid plan response.
pub fn planning_engine(dir: &Path) -> PathBuf {
    let event = format!(
        r#"{{"type":"result","result":"{PLAN_BODY}","usage":{{"input_tokens":3,"output_tokens":1}}}}"#
    );
    fake_engine(dir, &[&event], 0)
}

pub fn ralphy() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("ralphy").unwrap()
}

pub fn stdout_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).unwrap()
}

pub fn stderr_of(assert: &assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stderr.clone()).unwrap()
}
