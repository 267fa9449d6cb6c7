// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::process::Command;

use chrono::{Datelike, Local, Weekday};
use serde::{Deserialize, Serialize};

/// Variables consulted, in order, for the current branch before asking git.
pub const BRANCH_VARIABLES: [&str; 5] = [
    "PLANGUARD_GIT_BRANCH",
    "GITHUB_HEAD_REF",
    "GITHUB_REF_NAME",
    "CI_COMMIT_REF_NAME",
    "BRANCH_NAME",
];

/// Environment-derived values, read once at scan start and constant for
/// the rest of the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEnvironment {
    pub day_of_week: String,
    pub git_branch: String,
}

impl ScanEnvironment {
    pub fn new(day_of_week: &str, git_branch: &str) -> Self {
        Self {
            day_of_week: day_of_week.to_string(),
            git_branch: git_branch.to_string(),
        }
    }

    /// Read the local weekday and the current branch.
    pub fn capture() -> Self {
        let env = Self {
            day_of_week: weekday_name(Local::now().date_naive().weekday()).to_string(),
            git_branch: current_branch(),
        };
        log::debug!(
            "captured scan environment: day_of_week={} git_branch={}",
            env.day_of_week,
            env.git_branch
        );
        env
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn current_branch() -> String {
    for var in BRANCH_VARIABLES {
        if let Ok(branch) = std::env::var(var) {
            let branch = branch.trim();
            if !branch.is_empty() {
                return branch.to_string();
            }
        }
    }

    match Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
    {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        Ok(_) => String::new(),
        Err(e) => {
            log::debug!("git unavailable: {e}");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn weekday_of_fixed_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(date.map(|d| weekday_name(d.weekday())), Some("Friday"));
    }
}
