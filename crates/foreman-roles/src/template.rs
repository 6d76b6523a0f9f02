//! Instruction templates and command assembly.

use std::path::{Path, PathBuf};

use tracing::debug;

/// `{{NAME}}` placeholders and their values.
pub type Substitutions<'a> = [(&'a str, String)];

pub const DEVELOPER_TEMPLATE_FILE: &str = "developer.md";
pub const REVIEWER_TEMPLATE_FILE: &str = "reviewer.md";

pub const DEFAULT_DEVELOPER_TEMPLATE: &str = r#"You are a developer working on the {{REPO}} repository. Your task is to resolve GitHub issue #{{ISSUE_NUMBER}}.

## Instructions

1. Read the issue: `gh issue view {{ISSUE_NUMBER}}`
2. Understand the full context before writing any code
3. {{BRANCH_STEP}}
4. Implement the change following the project's conventions
5. Run the project's test suite and fix any failures
6. Push your commits: `git push -u origin HEAD`
7. When the work is complete and tests pass, open a draft PR:
   ```sh
   gh pr create --draft --title "{{PR_TITLE_PREFIX}}fix: <concise description>" --body "Closes #{{ISSUE_NUMBER}}" --label "{{REVIEW_LABEL}}"
   ```

## Rules

- Follow the existing code style and patterns
- Do not modify unrelated code
- If you hit a blocker, open the PR with what you have and add the label `needs-help`
- Keep the change focused on the issue
"#;

pub const DEFAULT_REVIEWER_TEMPLATE: &str = r#"You are the reviewer for pull requests in the {{REPO}} repository.

## PRs to Review

{{PR_SECTIONS}}

## Review Process

For each PR above:

1. Read the diff: `gh pr diff <number>`
2. Check correctness, quality, security, tests and consistency with the codebase

### If the PR is good
```sh
gh pr review <number> --approve --body "Review: Approved. <summary>"
gh pr edit <number> --remove-label "{{REVIEW_LABEL}}" --add-label "{{APPROVED_LABEL}}"
```

### If changes are needed
```sh
gh pr review <number> --request-changes --body "Review: Changes needed. <feedback>"
```
"#;

/// Template text from `prompts_dir/file_name`, or `fallback` when absent.
pub fn load_template(prompts_dir: &Path, file_name: &str, fallback: &str) -> String {
    let path = prompts_dir.join(file_name);
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            debug!(path = %path.display(), "using project template");
            text
        }
        Err(_) => fallback.to_string(),
    }
}

pub fn render(template: &str, values: &Substitutions<'_>) -> String {
    values.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{{{key}}}}}"), value)
    })
}

/// Single-quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Write instructions for `session` and return the file path.
pub fn write_instructions(prompts_dir: &Path, session: &str, text: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(prompts_dir)?;
    let path = prompts_dir.join(format!("{session}.md"));
    std::fs::write(&path, text)?;
    Ok(path)
}

/// `unset VARS; agent args... "$(cat 'file')"`
pub fn agent_command(
    unset_env: &[String],
    command: &str,
    args: &[String],
    instructions: &Path,
) -> String {
    let mut line = String::new();
    if !unset_env.is_empty() {
        line.push_str("unset ");
        line.push_str(&unset_env.join(" "));
        line.push_str("; ");
    }
    line.push_str(command);
    for arg in args {
        line.push(' ');
        line.push_str(&shell_quote(arg));
    }
    line.push_str(&format!(
        " \"$(cat {})\"",
        shell_quote(&instructions.to_string_lossy())
    ));
    line
}
