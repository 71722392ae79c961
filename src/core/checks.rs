// src/core/checks.rs

//! Built-in checks run before every deployment pass.

use crate::core::context::Context;
use crate::core::validation::{CheckFactory, CheckRegistry, CheckScope, ValidationCheck};
use crate::system::executor::ExecutionError;
use std::net::ToSocketAddrs;

const LOCAL_ADDRESSES: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// The checks every command runs, in order.
pub fn default_checks() -> CheckRegistry {
    CheckRegistry::new(vec![
        configuration_complete as CheckFactory,
        hostname,
        home_directory,
        ssh_login,
    ])
}

fn configuration_complete() -> Box<dyn ValidationCheck> {
    Box::new(ConfigurationCompleteCheck)
}

fn hostname() -> Box<dyn ValidationCheck> {
    Box::new(HostnameCheck)
}

fn home_directory() -> Box<dyn ValidationCheck> {
    Box::new(HomeDirectoryCheck)
}

fn ssh_login() -> Box<dyn ValidationCheck> {
    Box::new(SshLoginCheck)
}

fn has_host(ctx: &Context) -> bool {
    ctx.host().ok().flatten().is_some()
}

/// Every required prompt has a value. Nothing else can be checked without one.
pub struct ConfigurationCompleteCheck;

impl ValidationCheck for ConfigurationCompleteCheck {
    fn name(&self) -> &'static str {
        "ConfigurationCompleteCheck"
    }

    fn title(&self) -> &str {
        "Configuration is complete"
    }

    fn fatal_on_error(&self) -> bool {
        true
    }

    fn validate(&mut self, scope: &mut CheckScope<'_>) -> anyhow::Result<()> {
        if scope.ctx.hosts().is_empty() {
            scope.error(t!("check.config.no_hosts"));
            scope.help(t!("check.config.no_hosts_help"));
            return Ok(());
        }

        let Some(prompts) = scope.ctx.config.prompts().cloned() else {
            return Ok(());
        };
        let missing = prompts.required_missing(&scope.ctx.config)?;
        for value in &missing {
            scope.error(format!(t!("check.config.missing"), key = value.key, label = value.label));
        }
        if !missing.is_empty() {
            scope.help(t!("check.config.missing_help"));
        }
        Ok(())
    }
}

/// The host name of the current host resolves to an address.
pub struct HostnameCheck;

impl ValidationCheck for HostnameCheck {
    fn name(&self) -> &'static str {
        "HostnameCheck"
    }

    fn title(&self) -> &str {
        "Host name resolves"
    }

    fn enabled(&self, ctx: &Context) -> bool {
        has_host(ctx)
    }

    fn validate(&mut self, scope: &mut CheckScope<'_>) -> anyhow::Result<()> {
        let Some((address, _)) = scope.ctx.host_login()? else {
            return Ok(());
        };
        let port = scope
            .ctx
            .host_property("ssh_port")?
            .and_then(|v| v.as_u64())
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(22);

        match (address.as_str(), port)
            .to_socket_addrs()
            .map(|mut addrs| addrs.next())
        {
            Ok(Some(_)) => {
                scope.info(format!(t!("check.hostname.resolved"), host = address));
            }
            Ok(None) | Err(_) => {
                scope.error(format!(t!("check.hostname.unresolved"), host = address));
                scope.help(t!("check.hostname.unresolved_help"));
                return Ok(());
            }
        }

        if !address.contains('.') && !LOCAL_ADDRESSES.contains(&address.as_str()) {
            scope.optional_warning(
                "fqdn",
                format!(t!("check.hostname.not_qualified"), host = address),
            );
        }
        Ok(())
    }
}

/// The install root exists and is writable, or can be created.
pub struct HomeDirectoryCheck;

impl ValidationCheck for HomeDirectoryCheck {
    fn name(&self) -> &'static str {
        "HomeDirectoryCheck"
    }

    fn title(&self) -> &str {
        "Installation directory is writable"
    }

    fn enabled(&self, ctx: &Context) -> bool {
        has_host(ctx)
    }

    fn validate(&mut self, scope: &mut CheckScope<'_>) -> anyhow::Result<()> {
        let Some((address, user)) = scope.ctx.host_login()? else {
            return Ok(());
        };
        let Some(home) = scope.ctx.host_property_string("home_directory")? else {
            return Ok(());
        };

        let quoted = shlex::try_quote(&home)?;
        let probe = format!(
            "if [ -d {dir} ]; then test -w {dir}; else test -w \"$(dirname {dir})\"; fi",
            dir = quoted
        );
        match scope
            .ctx
            .executor()
            .query_remote(&probe, &address, user.as_deref())
        {
            Ok(_) => {}
            Err(ExecutionError::CommandFailed { .. }) => {
                scope.error(format!(t!("check.home.not_writable"), dir = home, host = address));
                scope.help(t!("check.home.not_writable_help"));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

/// SSH logins to the host work and land on the configured user.
pub struct SshLoginCheck;

impl SshLoginCheck {
    fn is_local(ctx: &Context) -> bool {
        matches!(ctx.host_login(), Ok(Some((address, _))) if LOCAL_ADDRESSES.contains(&address.as_str()))
    }
}

impl ValidationCheck for SshLoginCheck {
    fn name(&self) -> &'static str {
        "SshLoginCheck"
    }

    fn title(&self) -> &str {
        "SSH login works"
    }

    fn enabled(&self, ctx: &Context) -> bool {
        has_host(ctx) && !Self::is_local(ctx)
    }

    fn validate(&mut self, scope: &mut CheckScope<'_>) -> anyhow::Result<()> {
        let Some((address, user)) = scope.ctx.host_login()? else {
            return Ok(());
        };

        let login = match scope
            .ctx
            .executor()
            .query_remote("whoami", &address, user.as_deref())
        {
            Ok(out) => out.trim().to_string(),
            Err(e) => {
                scope.error(format!(t!("check.ssh.failed"), host = address, error = e));
                scope.help(t!("check.ssh.failed_help"));
                return Ok(());
            }
        };

        if let Some(expected) = user
            && login != expected
        {
            scope.error(format!(
                t!("check.ssh.wrong_user"),
                host = address,
                expected = expected,
                actual = login
            ));
        }
        Ok(())
    }
}
