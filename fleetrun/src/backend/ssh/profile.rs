//! Platform profiles for CLI devices.
//!
//! A profile tells the SSH backend how to drive one family of devices:
//! what the prompt looks like, how to enter and leave configuration mode,
//! which output means a command was rejected, and which commands answer
//! each getter.
//!
//! Prompt patterns are adapted from scrapli's drivers and use `(?mi)` so
//! `^`/`$` anchor on line boundaries.
//!
//! # Config flow
//!
//! ```text
//! enter_config -> commands... -> [compare] -> [commit] -> exit_config
//!                     |
//!                rejected -> [abort] -> exit_config
//! ```
//!
//! Profiles with a `commit_command` are transactional: nothing reaches the
//! running configuration until commit, so a rejected command leaves the
//! device untouched. Session-based profiles apply each line immediately.

use indexmap::IndexMap;
use regex::bytes::Regex;

/// Escalation from an unprivileged prompt (e.g. `enable`).
#[derive(Debug, Clone)]
pub struct Escalation {
    /// Prompt pattern that means escalation is needed.
    pub unprivileged: Regex,

    /// Command to escalate.
    pub command: String,

    /// Password prompt that may follow the command.
    pub password_prompt: Regex,
}

/// How to drive one platform over an interactive CLI.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    /// Platform tag (e.g. "cisco_ios").
    pub name: String,

    /// Matches any prompt the session can end a command on.
    pub prompt: Regex,

    /// Optional privilege escalation after login.
    pub escalation: Option<Escalation>,

    /// Commands run after login (paging off, terminal width).
    pub on_open_commands: Vec<String>,

    /// Commands that enter configuration mode.
    pub enter_config: Vec<String>,

    /// Commands that leave configuration mode.
    pub exit_config: Vec<String>,

    /// Shows pending changes; empty output means nothing changed.
    pub compare_command: Option<String>,

    /// Commits pending changes.
    pub commit_command: Option<String>,

    /// Discards pending changes.
    pub abort_command: Option<String>,

    /// Output substrings that mean a command was rejected.
    pub failed_when_contains: Vec<String>,

    /// Output lines starting with these are dropped.
    pub ignored_line_prefixes: Vec<String>,

    /// Getter name to the commands answering it.
    pub getters: IndexMap<String, Vec<String>>,
}

impl PlatformProfile {
    /// Create a profile with a prompt pattern and nothing else.
    pub fn new(name: impl Into<String>, prompt: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            prompt: Regex::new(prompt)?,
            escalation: None,
            on_open_commands: vec![],
            enter_config: vec![],
            exit_config: vec![],
            compare_command: None,
            commit_command: None,
            abort_command: None,
            failed_when_contains: vec![],
            ignored_line_prefixes: vec![],
            getters: IndexMap::new(),
        })
    }

    /// Escalate with `command` when the login prompt matches `unprivileged`.
    pub fn with_escalation(
        mut self,
        unprivileged: &str,
        command: impl Into<String>,
        password_prompt: &str,
    ) -> Result<Self, regex::Error> {
        self.escalation = Some(Escalation {
            unprivileged: Regex::new(unprivileged)?,
            command: command.into(),
            password_prompt: Regex::new(password_prompt)?,
        });
        Ok(self)
    }

    /// Add an on-open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Set the configuration mode entry and exit commands.
    pub fn with_config_mode(mut self, enter: &[&str], exit: &[&str]) -> Self {
        self.enter_config = enter.iter().map(|c| c.to_string()).collect();
        self.exit_config = exit.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Set the command listing pending changes.
    pub fn with_compare(mut self, command: impl Into<String>) -> Self {
        self.compare_command = Some(command.into());
        self
    }

    /// Set commit and abort commands, making the profile transactional.
    pub fn with_commit(mut self, commit: impl Into<String>, abort: impl Into<String>) -> Self {
        self.commit_command = Some(commit.into());
        self.abort_command = Some(abort.into());
        self
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Drop output lines starting with `prefix`.
    pub fn with_ignored_line_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_line_prefixes.push(prefix.into());
        self
    }

    /// Map a getter to the commands answering it.
    pub fn with_getter(mut self, getter: impl Into<String>, commands: &[&str]) -> Self {
        self.getters.insert(
            getter.into(),
            commands.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// Whether changes are staged and committed atomically.
    pub fn is_transactional(&self) -> bool {
        self.commit_command.is_some()
    }

    /// First failure pattern found in `output`.
    pub fn detect_failure(&self, output: &str) -> Option<&str> {
        self.failed_when_contains
            .iter()
            .find(|pattern| output.contains(pattern.as_str()))
            .map(String::as_str)
    }
}

/// Look up a built-in profile by platform tag.
pub fn builtin(name: &str) -> Option<PlatformProfile> {
    match name {
        "linux" => Some(linux()),
        "cisco_ios" => Some(cisco_ios()),
        "arista_eos" => Some(arista_eos()),
        "juniper_junos" => Some(juniper_junos()),
        _ => None,
    }
}

/// Every built-in profile.
pub fn builtin_profiles() -> Vec<PlatformProfile> {
    vec![linux(), cisco_ios(), arista_eos(), juniper_junos()]
}

/// Linux/Unix shells with `$` and `#` prompts. Configuration commands run
/// as plain shell commands.
pub fn linux() -> PlatformProfile {
    PlatformProfile::new("linux", r"(?m)[$#]\s*$")
        .unwrap()
        .with_failure_pattern("command not found")
        .with_failure_pattern("No such file or directory")
        .with_failure_pattern("Permission denied")
        .with_failure_pattern("Operation not permitted")
        .with_getter("facts", &["uname -a", "hostname"])
        .with_getter("interfaces_ip", &["ip -brief address"])
        .with_getter("uptime", &["uptime"])
}

/// Cisco IOS / IOS-XE.
pub fn cisco_ios() -> PlatformProfile {
    PlatformProfile::new("cisco_ios", r"(?mi)^[\w.\-@()/:]{1,63}[>#]\s?$")
        .unwrap()
        .with_escalation(
            r"(?mi)^[\w.\-@()/:]{1,63}>\s?$",
            "enable",
            r"(?mi)^password:\s?$",
        )
        .unwrap()
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 512")
        .with_config_mode(&["configure terminal"], &["end"])
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Invalid input detected")
        .with_failure_pattern("% Unknown command")
        .with_getter("facts", &["show version"])
        .with_getter("interfaces", &["show interfaces"])
        .with_getter("interfaces_ip", &["show ip interface brief"])
        .with_getter("arp_table", &["show arp"])
        .with_getter("config", &["show running-config"])
}

/// Arista EOS.
pub fn arista_eos() -> PlatformProfile {
    PlatformProfile::new("arista_eos", r"(?mi)^[\w.\-@()/: ]{1,63}[>#]\s?$")
        .unwrap()
        .with_escalation(
            r"(?mi)^[\w.\-@()/: ]{1,63}>\s?$",
            "enable",
            r"(?mi)^password:\s?$",
        )
        .unwrap()
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 32767")
        .with_config_mode(&["configure terminal"], &["end"])
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Error")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Invalid input")
        .with_failure_pattern("% Cannot commit")
        .with_failure_pattern("% Unavailable command")
        .with_getter("facts", &["show version"])
        .with_getter("interfaces", &["show interfaces"])
        .with_getter("interfaces_ip", &["show ip interface brief"])
        .with_getter("lldp_neighbors", &["show lldp neighbors"])
        .with_getter("config", &["show running-config"])
}

/// Juniper JUNOS. Transactional: changes are staged, compared and committed.
pub fn juniper_junos() -> PlatformProfile {
    PlatformProfile::new(
        "juniper_junos",
        r"(?mi)^(\{\w+(:(\w+)?\d)?\}(\[edit\])?\n)?[\w\-@()/:\.]{1,63}[>#]\s?$",
    )
    .unwrap()
    .with_on_open_command("set cli screen-length 0")
    .with_on_open_command("set cli screen-width 511")
    .with_config_mode(&["configure"], &["exit configuration-mode"])
    .with_compare("show | compare")
    .with_commit("commit", "rollback 0")
    .with_failure_pattern("unknown command")
    .with_failure_pattern("syntax error")
    .with_failure_pattern("error:")
    .with_failure_pattern("missing argument")
    .with_failure_pattern("is ambiguous")
    .with_failure_pattern("No valid completions")
    .with_ignored_line_prefix("[edit")
    .with_getter("facts", &["show version"])
    .with_getter("interfaces", &["show interfaces terse"])
    .with_getter("interfaces_ip", &["show interfaces terse"])
    .with_getter("lldp_neighbors", &["show lldp neighbors"])
    .with_getter("config", &["show configuration"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        for name in ["linux", "cisco_ios", "arista_eos", "juniper_junos"] {
            let profile = builtin(name).unwrap();
            assert_eq!(profile.name, name);
            assert!(profile.getters.contains_key("facts"));
        }
        assert!(builtin("netware").is_none());
        assert_eq!(builtin_profiles().len(), 4);
    }

    #[test]
    fn test_linux_prompts() {
        let profile = linux();
        assert!(profile.prompt.is_match(b"user@host:~$ "));
        assert!(profile.prompt.is_match(b"root@host:~# "));
        assert!(!profile.prompt.is_match(b"Last login: today"));
        assert!(profile.enter_config.is_empty());
    }

    #[test]
    fn test_cisco_prompts_and_escalation() {
        let profile = cisco_ios();
        assert!(profile.prompt.is_match(b"router>"));
        assert!(profile.prompt.is_match(b"router#"));
        assert!(profile.prompt.is_match(b"output line\nrouter(config)#"));
        assert!(profile.prompt.is_match(b"router(config-if)# "));

        let escalation = profile.escalation.as_ref().unwrap();
        assert!(escalation.unprivileged.is_match(b"router>"));
        assert!(!escalation.unprivileged.is_match(b"router#"));
        assert!(escalation.password_prompt.is_match(b"Password: "));
    }

    #[test]
    fn test_arista_prompts() {
        let profile = arista_eos();
        assert!(profile.prompt.is_match(b"switch>"));
        assert!(profile.prompt.is_match(b"switch#"));
        assert!(profile.prompt.is_match(b"switch(config-if-Et1)#"));
    }

    #[test]
    fn test_juniper_prompts() {
        let profile = juniper_junos();
        assert!(profile.prompt.is_match(b"user@router>"));
        assert!(profile.prompt.is_match(b"user@router# "));
        assert!(profile.prompt.is_match(b"{master:0}\nuser@router>"));
        assert!(profile.prompt.is_match(b"{master:0}[edit]\nuser@router#"));
        assert!(profile.is_transactional());
        assert!(!cisco_ios().is_transactional());
    }

    #[test]
    fn test_detect_failure() {
        let profile = cisco_ios();
        assert_eq!(
            profile.detect_failure("ntp srver 1.1.1.1\n% Invalid input detected at '^' marker."),
            Some("% Invalid input detected")
        );
        assert_eq!(profile.detect_failure("ntp server 1.1.1.1"), None);
    }
}
