//! Prompt construction for the reasoning service.

use std::fmt::Write as _;

use crate::schema::Snapshot;

use super::service::ReasoningRequest;

/// Role and output contract sent with every request.
pub const SYSTEM_PROMPT: &str = "\
You are an expert in real-time particle effects. \
You turn a short natural-language description of a desired look into concrete parameter changes.

Common parameters:
- SpawnRate (Float): particles spawned per second; higher means more particles
- Lifetime (Float): seconds each particle lives
- Color (Color): linear RGBA, each channel 0 to 1
- Size (Vector3): particle scale along X Y Z
- Velocity (Vector3): initial velocity along X Y Z

Only change parameters that appear in the current parameter list, using their exact names.
Stay inside each parameter's range.

Output format, one change per line:
<name>,<type>,<value>

<type> is one of Float, Int, Bool, Vector3, Color.
Vector3 values are three numbers separated by spaces. Color values are three or four numbers separated by spaces.
You may add one final line `explanation: <short reason>`.
Output nothing else: no prose, no JSON, no code fences.

Example:
SpawnRate,Float,300
Color,Color,1.0 0.3 0.05 1.0
Size,Vector3,2 2 2
explanation: denser and larger particles with a hotter color";

/// Build the request for one instruction against the current state.
pub fn build_request(snapshot: &Snapshot, instruction: &str) -> ReasoningRequest {
    ReasoningRequest {
        system: SYSTEM_PROMPT.to_string(),
        user: user_prompt(snapshot, instruction),
    }
}

fn user_prompt(snapshot: &Snapshot, instruction: &str) -> String {
    let mut out = String::from("Current parameters:\n");
    if snapshot.is_empty() {
        out.push_str("(none)\n");
    }
    for entry in snapshot.entries() {
        let d = &entry.descriptor;
        // Writing to a String cannot fail.
        let _ = match d.range {
            Some(range) => writeln!(out, "- {} ({}, range {}) = {}", d.name, d.ty, range, entry.value),
            None => writeln!(out, "- {} ({}) = {}", d.name, d.ty, entry.value),
        };
    }
    let _ = write!(out, "\nInstruction: {}", instruction.trim());
    out
}
