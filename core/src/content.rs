//! Micro-copy selection and message shell rendering.

use crate::checkins::{Branch, Channel, MessageTemplate};

pub const GENERIC_DIAGNOSIS: &str = "generic";
pub const ENCOURAGEMENT_POOL_LIMIT: i64 = 100;
pub const DEFAULT_ENCOURAGEMENT: &str =
    "Small, steady steps add up. Keep moving in ways that feel manageable.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertKey {
    pub diagnosis_code: String,
    pub branch: Branch,
}

/// Ordered lookup keys for a micro-insert, most specific first.
///
/// Diagnosis-specific copy is tried against every branch candidate before
/// falling back to the generic diagnosis.
pub fn insert_candidates(diagnosis_code: &str, branch: Branch) -> Vec<InsertKey> {
    let branches: &[Branch] = match branch {
        Branch::Initial => &[Branch::Initial, Branch::Same],
        Branch::Better => &[Branch::Better],
        Branch::Same => &[Branch::Same],
        Branch::Worse => &[Branch::Worse],
    };

    let code = diagnosis_code.trim().to_lowercase();
    let mut diagnoses = Vec::with_capacity(2);
    if !code.is_empty() && code != GENERIC_DIAGNOSIS {
        diagnoses.push(code);
    }
    diagnoses.push(GENERIC_DIAGNOSIS.to_string());

    diagnoses
        .into_iter()
        .flat_map(|diagnosis_code| {
            branches.iter().map(move |branch| InsertKey {
                diagnosis_code: diagnosis_code.clone(),
                branch: *branch,
            })
        })
        .collect()
}

pub fn template_key(day: i32, branch: Branch) -> String {
    format!("day{day}.{branch}")
}

/// Template keys to try for a day/branch before the built-in shell.
pub fn template_candidates(day: i32, branch: Branch) -> Vec<String> {
    let mut keys = vec![template_key(day, branch)];
    if branch != Branch::Initial {
        keys.push(template_key(day, Branch::Initial));
    }
    keys
}

/// Shell used when no template row exists for the day and channel.
pub fn builtin_template(day: i32, branch: Branch, channel: Channel) -> MessageTemplate {
    let (subject, shell_text) = match channel {
        Channel::Email => (
            format!("Day {day} check-in: how is your back today?"),
            "Hi,\n\n\
             It's day {{day}} since your assessment. {{insert}}\n\n\
             Compared with your last check-in, how are you feeling?\n\n\
             Better: {{better_url}}\n\
             About the same: {{same_url}}\n\
             Worse: {{worse_url}}\n\n\
             {{encouragement}}"
                .to_string(),
        ),
        Channel::Sms => (
            String::new(),
            "Day {{day}} check-in. {{insert}} How is your pain today from 0 (none) to 10 (worst)? \
             Reply with a number. Reply STOP to opt out."
                .to_string(),
        ),
    };

    MessageTemplate {
        key: template_key(day, branch),
        subject,
        shell_text,
        disclaimer_text: "This message is educational and not medical advice. \
                          If your symptoms change suddenly, contact a clinician."
            .to_string(),
        channel,
    }
}

/// Values spliced into a message shell.
#[derive(Debug, Clone, Default)]
pub struct ShellVars<'a> {
    pub day: i32,
    pub insert: &'a str,
    pub encouragement: &'a str,
    pub better_url: &'a str,
    pub same_url: &'a str,
    pub worse_url: &'a str,
}

/// Substitute `{{placeholders}}`. An empty insert removes its block entirely,
/// including the line it would have occupied.
pub fn render_shell(shell: &str, vars: &ShellVars<'_>) -> String {
    let day = vars.day.to_string();
    let replacements = [
        ("{{day}}", day.as_str()),
        ("{{insert}}", vars.insert.trim()),
        ("{{encouragement}}", vars.encouragement.trim()),
        ("{{better_url}}", vars.better_url),
        ("{{same_url}}", vars.same_url),
        ("{{worse_url}}", vars.worse_url),
    ];

    let mut lines = Vec::new();
    for line in shell.lines() {
        let mut rendered = line.to_string();
        for (placeholder, value) in &replacements {
            rendered = rendered.replace(placeholder, value);
        }
        let dropped_block = !line.trim().is_empty() && rendered.trim().is_empty();
        if dropped_block {
            continue;
        }
        lines.push(collapse_spaces(&rendered));
    }
    lines.join("\n").trim().to_string()
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut previous_space = false;
    for ch in line.chars() {
        if ch == ' ' {
            if previous_space {
                continue;
            }
            previous_space = true;
        } else {
            previous_space = false;
        }
        out.push(ch);
    }
    out.trim_end().to_string()
}

/// Append the disclaimer as its own paragraph when one is configured.
pub fn with_disclaimer(body: &str, disclaimer: &str) -> String {
    let disclaimer = disclaimer.trim();
    if disclaimer.is_empty() {
        body.to_string()
    } else {
        format!("{body}\n\n{disclaimer}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(candidates: &[InsertKey]) -> Vec<(String, Branch)> {
        candidates
            .iter()
            .map(|key| (key.diagnosis_code.clone(), key.branch))
            .collect()
    }

    #[test]
    fn initial_branch_falls_back_to_same_before_generic() {
        let candidates = insert_candidates("lbp_mechanical", Branch::Initial);
        assert_eq!(
            keys(&candidates),
            vec![
                ("lbp_mechanical".to_string(), Branch::Initial),
                ("lbp_mechanical".to_string(), Branch::Same),
                ("generic".to_string(), Branch::Initial),
                ("generic".to_string(), Branch::Same),
            ]
        );
    }

    #[test]
    fn outcome_branch_only_tries_itself() {
        let candidates = insert_candidates("Sciatica", Branch::Worse);
        assert_eq!(
            keys(&candidates),
            vec![
                ("sciatica".to_string(), Branch::Worse),
                ("generic".to_string(), Branch::Worse),
            ]
        );
    }

    #[test]
    fn generic_code_is_not_duplicated() {
        let candidates = insert_candidates("generic", Branch::Better);
        assert_eq!(keys(&candidates), vec![("generic".to_string(), Branch::Better)]);
        let blank = insert_candidates("  ", Branch::Better);
        assert_eq!(keys(&blank), vec![("generic".to_string(), Branch::Better)]);
    }

    #[test]
    fn template_candidates_fall_back_to_initial() {
        assert_eq!(template_candidates(7, Branch::Worse), vec!["day7.worse", "day7.initial"]);
        assert_eq!(template_candidates(3, Branch::Initial), vec!["day3.initial"]);
    }

    #[test]
    fn render_substitutes_placeholders() {
        let body = render_shell(
            "Day {{day}}. {{insert}}\nBetter: {{better_url}}",
            &ShellVars {
                day: 7,
                insert: "Walking helps.",
                better_url: "https://x/b",
                ..Default::default()
            },
        );
        assert_eq!(body, "Day 7. Walking helps.\nBetter: https://x/b");
    }

    #[test]
    fn empty_insert_omits_its_line() {
        let body = render_shell(
            "Hello\n{{insert}}\nBye {{encouragement}}",
            &ShellVars {
                day: 3,
                encouragement: "Keep going.",
                ..Default::default()
            },
        );
        assert_eq!(body, "Hello\nBye Keep going.");
    }

    #[test]
    fn builtin_sms_shell_renders_without_insert() {
        let template = builtin_template(14, Branch::Initial, Channel::Sms);
        let body = render_shell(
            &template.shell_text,
            &ShellVars {
                day: 14,
                ..Default::default()
            },
        );
        assert!(body.starts_with("Day 14 check-in. How is your pain"));
        assert!(!body.contains("{{"));
    }
}
