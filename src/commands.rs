// src/commands.rs
//! Command handlers for the anaconda CLI

use anaconda::cmdline::{self, PrefixPolicy};
use anaconda::payload::switcher::current_source_type;
use anaconda::payload::{PayloadKind, PayloadPhase, SimulatedPayload, SourceType};
use anaconda::subscription::{SecretData, SimulatedSubscription, SubscriptionRequest};
use anaconda::{InstallerConfig, Orchestrator, ThreadRegistry};
use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

fn policy(strict: bool) -> PrefixPolicy {
    if strict {
        PrefixPolicy::Strict
    } else {
        PrefixPolicy::Lenient
    }
}

/// Parse boot arguments and print them as JSON
pub fn cmd_cmdline(file: &Path, args: Option<&str>, strict: bool) -> Result<()> {
    let boot_args = match args {
        Some(args) => cmdline::parse(args, policy(strict))?,
        None => cmdline::read_cmdline(file, policy(strict))?,
    };

    let output = serde_json::json!({
        "boot_args": boot_args,
        "source_type": boot_args.repo_source_type(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print the effective configuration
pub fn cmd_config(mut config: InstallerConfig, boot_args: Option<&str>) -> Result<()> {
    if let Some(boot_args) = boot_args {
        let parsed = cmdline::parse(boot_args, PrefixPolicy::Lenient)
            .context("Failed to parse boot arguments")?;
        config.apply_boot_args(&parsed);
        config.validate()?;
    }

    print!("{}", config.to_toml_string()?);
    Ok(())
}

/// Options for `anaconda simulate`
pub struct SimulateOptions {
    pub kind: PayloadKind,
    pub source: Option<SourceType>,
    pub fail_setup: bool,
    pub fail_metadata: bool,
    pub only_on_change: bool,
    pub register: bool,
}

/// Run one payload preparation against the in-memory backends
pub fn cmd_simulate(mut config: InstallerConfig, options: SimulateOptions) -> Result<()> {
    if options.only_on_change {
        config.payload.only_on_change = true;
    }

    let mut payload = SimulatedPayload::new(options.kind);
    if let Some(source) = options.source {
        payload = payload.with_sources(&[source]);
    }
    if options.fail_setup {
        payload = payload.fail_setup("simulated setup failure");
    }
    if options.fail_metadata {
        payload = payload.fail_metadata("simulated repository timeout");
    }

    let mut request = SubscriptionRequest {
        account_username: "simulated".to_string(),
        account_password: SecretData::text("simulated"),
        ..Default::default()
    };
    config.apply_subscription_proxy(&mut request)?;
    let subscription = SimulatedSubscription::new().with_request(request);

    let threads = Arc::new(ThreadRegistry::new().with_error_hook(|name, e| {
        error!("Unhandled error in thread {}: {:#}", name, e);
    }));
    let orchestrator = Orchestrator::new(config, threads, Arc::new(payload), Arc::new(subscription));

    if let Some(source) = orchestrator.prepare_sources()? {
        println!("Source: {}", source);
    }

    let manager = orchestrator.payload_manager();
    for phase in PayloadPhase::ORDERED
        .into_iter()
        .chain([PayloadPhase::Error, PayloadPhase::Terminated])
    {
        manager.add_listener(phase, move || {
            println!("{:<28} {}", phase.to_string(), phase.description());
        });
    }

    if options.register {
        orchestrator.register(
            |phase| println!("{:<28} {}", phase.to_string(), phase.description()),
            |e| println!("{:<28} {}", "SUBSCRIPTION_ERROR", e),
        )?;
    }
    orchestrator.restart_payload();

    let outcome = orchestrator.wait_for_payload();
    let unobserved = orchestrator.shutdown();
    info!(
        "Simulation finished in {:?} with {} unobserved thread errors",
        outcome,
        unobserved.len()
    );

    if let Some(source_type) = current_source_type(orchestrator.payload().as_ref()) {
        println!("Final source: {}", source_type);
    }

    if outcome == Some(PayloadPhase::Error) {
        let message = manager.last_error().unwrap_or_default();
        bail!("Payload preparation failed: {}", message);
    }
    Ok(())
}
