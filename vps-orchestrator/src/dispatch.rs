//! Text command surface used by chat front ends.
//!
//! Commands arrive already split into an operation name and positional
//! arguments. Numbers typed by users are 1-based; the coordinator works with
//! 0-based inventory indices.

use serde::Serialize;
use tracing::debug;
use vps_hypervisor::VmSpecs;

use crate::coordinator::LifecycleCoordinator;
use crate::credentials::IssuedCredentials;
use crate::error::FleetError;
use crate::models::VmRecord;

const CREATE_USAGE: &str = "Usage: create <ram> <cpu> <disk> @user";

const USER_HELP: &str = "User commands:\n\
    myvps - List your VPS instances\n\
    start <num> - Start a VPS\n\
    stop <num> - Stop a VPS\n\
    ping - Check the bot is alive";

const ADMIN_HELP: &str = "Admin commands:\n\
    create <ram> <cpu> <disk> @user - Create a VPS\n\
    delete <num> [@user] - Delete a VPS\n\
    stats - Server stats";

/// Panel access shown once, when an account is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserFacingResult {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<VmRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<VmRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PanelCredentials>,
    /// The hypervisor did not answer in time; the outcome is unknown
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub pending: bool,
}

impl UserFacingResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_record(mut self, record: VmRecord) -> Self {
        self.record = Some(record);
        self
    }

    /// Map a coordinator error to a reply. `number` is the 1-based VPS number
    /// the user typed, if any.
    pub fn from_error(err: &FleetError, number: Option<usize>) -> Self {
        match (err, number) {
            (FleetError::NotFound(_), Some(n)) => Self::fail(format!("VPS #{} does not exist", n)),
            (FleetError::Timeout(_), _) => Self {
                pending: true,
                ..Self::fail(format!(
                    "The hypervisor did not respond in time; the VPS state is unknown ({})",
                    err
                ))
            },
            _ => Self::fail(err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    coordinator: LifecycleCoordinator,
    panel_url: Option<String>,
}

impl CommandDispatcher {
    pub fn new(coordinator: LifecycleCoordinator, panel_url: Option<String>) -> Self {
        Self {
            coordinator,
            panel_url,
        }
    }

    pub fn coordinator(&self) -> &LifecycleCoordinator {
        &self.coordinator
    }

    /// Run one command on behalf of `caller_id`. `target_id` is the tenant
    /// mentioned in the command, if any.
    pub async fn invoke(
        &self,
        operation: &str,
        caller_id: &str,
        args: &[String],
        target_id: Option<&str>,
    ) -> UserFacingResult {
        let operation = operation.trim().trim_start_matches('!').to_ascii_lowercase();
        debug!(%operation, caller_id, args = args.len(), "dispatching command");

        match operation.as_str() {
            "ping" => UserFacingResult::ok("Pong!"),
            "help" => self.help(caller_id),
            "create" => self.create(caller_id, args, target_id).await,
            "myvps" => self.my_vps(caller_id).await,
            "start" => self.start(caller_id, args).await,
            "stop" => self.stop(caller_id, args).await,
            "delete" => self.delete(caller_id, args, target_id).await,
            "stats" => self.stats(caller_id).await,
            other => UserFacingResult::fail(format!(
                "Unknown command '{}'. Try 'help'.",
                other
            )),
        }
    }

    fn help(&self, caller_id: &str) -> UserFacingResult {
        if self.coordinator.is_admin(caller_id) {
            UserFacingResult::ok(format!("{}\n\n{}", USER_HELP, ADMIN_HELP))
        } else {
            UserFacingResult::ok(USER_HELP)
        }
    }

    /// Admin-only commands refuse non-admins before looking at arguments.
    fn refuse_non_admin(&self, caller_id: &str, action: &str) -> Option<UserFacingResult> {
        if self.coordinator.is_admin(caller_id) {
            return None;
        }
        let err = FleetError::Authorization(format!("only admins can {} VPS instances", action));
        Some(UserFacingResult::from_error(&err, None))
    }

    fn panel_credentials(&self, credentials: IssuedCredentials) -> Option<PanelCredentials> {
        let username = credentials.account.panel_username;
        credentials.secret.map(|password| PanelCredentials {
            url: self.panel_url.clone(),
            username,
            password,
        })
    }

    async fn create(&self, caller_id: &str, args: &[String], target_id: Option<&str>) -> UserFacingResult {
        if let Some(refusal) = self.refuse_non_admin(caller_id, "create") {
            return refusal;
        }
        let (Some(target_id), [ram, cpu, disk, ..]) = (target_id, args) else {
            return UserFacingResult::fail(CREATE_USAGE);
        };
        let (Ok(ram_gib), Ok(vcpu), Ok(disk_gib)) =
            (ram.parse::<u32>(), cpu.parse::<u32>(), disk.parse::<u32>())
        else {
            return UserFacingResult::fail(CREATE_USAGE);
        };
        let specs = VmSpecs {
            ram_gib,
            vcpu,
            disk_gib,
        };

        match self.coordinator.create(caller_id, target_id, specs).await {
            Ok(outcome) => {
                let username = outcome.credentials.account.panel_username.clone();
                let mut message = format!(
                    "VPS created for {}: {} ({})",
                    target_id, outcome.record.vm_name, specs
                );
                let credentials = self.panel_credentials(outcome.credentials);
                if credentials.is_none() {
                    message.push_str(&format!("\nPanel user: {} (existing account)", username));
                }

                UserFacingResult {
                    credentials,
                    ..UserFacingResult::ok(message).with_record(outcome.record)
                }
            }
            Err(failure) => {
                let mut reply = UserFacingResult::from_error(&failure.error, None);
                reply.credentials = failure
                    .credentials
                    .and_then(|issued| self.panel_credentials(issued));
                if reply.credentials.is_some() {
                    reply
                        .message
                        .push_str("\nA panel account was created; keep these credentials.");
                }
                reply
            }
        }
    }

    async fn my_vps(&self, caller_id: &str) -> UserFacingResult {
        let records = match self.coordinator.list(caller_id).await {
            Ok(records) => records,
            Err(e) => return UserFacingResult::from_error(&e, None),
        };
        if records.is_empty() {
            return UserFacingResult::fail("No VPS found. Contact an admin.");
        }

        let lines: Vec<String> = records
            .iter()
            .enumerate()
            .map(|(i, r)| format!("VPS {}: {} - {} - {}", i + 1, r.vm_name, r.status, r.specs))
            .collect();

        UserFacingResult {
            records,
            ..UserFacingResult::ok(format!("Your VPS instances:\n{}", lines.join("\n")))
        }
    }

    async fn start(&self, caller_id: &str, args: &[String]) -> UserFacingResult {
        let Some(number) = parse_number(args.first()) else {
            return UserFacingResult::fail("Invalid VPS number");
        };
        match self.coordinator.start(caller_id, number - 1).await {
            Ok(record) => UserFacingResult::ok(format!("VPS #{} started", number)).with_record(record),
            Err(e) => UserFacingResult::from_error(&e, Some(number)),
        }
    }

    async fn stop(&self, caller_id: &str, args: &[String]) -> UserFacingResult {
        let Some(number) = parse_number(args.first()) else {
            return UserFacingResult::fail("Invalid VPS number");
        };
        match self.coordinator.stop(caller_id, number - 1).await {
            Ok(record) => UserFacingResult::ok(format!("VPS #{} stopped", number)).with_record(record),
            Err(e) => UserFacingResult::from_error(&e, Some(number)),
        }
    }

    async fn delete(&self, caller_id: &str, args: &[String], target_id: Option<&str>) -> UserFacingResult {
        if let Some(refusal) = self.refuse_non_admin(caller_id, "delete") {
            return refusal;
        }
        let Some(number) = parse_number(args.first()) else {
            return UserFacingResult::fail("Invalid VPS number");
        };
        let target_id = target_id.unwrap_or(caller_id);

        match self.coordinator.delete_for(caller_id, target_id, number - 1).await {
            Ok(outcome) => {
                let mut message = format!("VPS #{} ({}) deleted", number, outcome.record.vm_name);
                if !outcome.warnings.is_empty() {
                    message.push_str(&format!("\nCleanup warnings: {}", outcome.warnings.join("; ")));
                }
                UserFacingResult::ok(message).with_record(outcome.record)
            }
            Err(e) => UserFacingResult::from_error(&e, Some(number)),
        }
    }

    async fn stats(&self, caller_id: &str) -> UserFacingResult {
        match self.coordinator.stats(caller_id).await {
            Ok(stats) => UserFacingResult::ok(format!(
                "Total users: {}\nTotal VPS: {} ({} running, {} stopped)",
                stats.tenants, stats.vms, stats.running, stats.stopped
            )),
            Err(e) => UserFacingResult::from_error(&e, None),
        }
    }
}

/// Parse a 1-based VPS number. Zero and non-numbers are rejected.
fn parse_number(arg: Option<&String>) -> Option<usize> {
    arg?.trim().parse::<usize>().ok().filter(|n| *n >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(Some(&"1".to_string())), Some(1));
        assert_eq!(parse_number(Some(&" 3 ".to_string())), Some(3));
        assert_eq!(parse_number(Some(&"0".to_string())), None);
        assert_eq!(parse_number(Some(&"-1".to_string())), None);
        assert_eq!(parse_number(Some(&"abc".to_string())), None);
        assert_eq!(parse_number(None), None);
    }

    #[test]
    fn test_timeout_sets_pending() {
        let reply = UserFacingResult::from_error(&FleetError::Timeout("start of vm".into()), Some(1));
        assert!(!reply.ok);
        assert!(reply.pending);
    }

    #[test]
    fn test_not_found_uses_typed_number() {
        let reply = UserFacingResult::from_error(&FleetError::NotFound("no VPS at index 4".into()), Some(5));
        assert_eq!(reply.message, "VPS #5 does not exist");
        assert!(!reply.pending);
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_value(UserFacingResult::ok("Pong!")).unwrap();
        assert_eq!(json, serde_json::json!({ "ok": true, "message": "Pong!" }));
    }
}
