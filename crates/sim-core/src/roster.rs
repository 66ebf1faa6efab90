//! Agent roster loading.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use sim_records::AgentProfile;

use crate::SimError;

/// Parses one profile per non-empty line of a JSONL file.
pub fn load_profiles(path: &Path) -> Result<Vec<AgentProfile>, SimError> {
    let content = fs::read_to_string(path).map_err(|e| {
        SimError::Configuration(format!("cannot read profiles '{}': {}", path.display(), e))
    })?;
    parse_profiles(&content)
}

pub fn parse_profiles(content: &str) -> Result<Vec<AgentProfile>, SimError> {
    let mut profiles = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let profile = AgentProfile::from_jsonl(line).map_err(|e| {
            SimError::Configuration(format!("invalid profile on line {}: {}", idx + 1, e))
        })?;
        profiles.push(profile);
    }
    Ok(profiles)
}

/// The first `num_agents` profiles by handle.
///
/// Fails when handles repeat or there are fewer profiles than requested.
pub fn build_roster(
    profiles: &[AgentProfile],
    num_agents: usize,
) -> Result<Vec<AgentProfile>, SimError> {
    let mut handles = HashSet::with_capacity(profiles.len());
    for profile in profiles {
        if !handles.insert(profile.handle.as_str()) {
            return Err(SimError::Configuration(format!(
                "duplicate agent handle '{}'",
                profile.handle
            )));
        }
    }
    if profiles.len() < num_agents {
        return Err(SimError::InsufficientAgents {
            requested: num_agents,
            available: profiles.len(),
        });
    }

    let mut roster = profiles.to_vec();
    roster.sort_by(|a, b| a.handle.cmp(&b.handle));
    roster.truncate(num_agents);
    Ok(roster)
}
