//! Operation identities

use vlink_core::{Command, CommandKind};

/// Identity of a logical request, used for deduplication
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperationKey {
    Login,
    FetchVehicles,
    FetchVehicleStatus { vin: String },
    /// `payload` is the serialized command, so only identical commands
    /// share a key
    SendCommand {
        vin: String,
        command: CommandKind,
        payload: String,
    },
}

impl OperationKey {
    pub fn send_command(vin: impl Into<String>, command: &Command) -> Self {
        let payload = serde_json::to_string(command).unwrap_or_else(|_| format!("{:?}", command));
        OperationKey::SendCommand {
            vin: vin.into(),
            command: command.kind(),
            payload,
        }
    }
}

impl std::fmt::Display for OperationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKey::Login => write!(f, "login"),
            OperationKey::FetchVehicles => write!(f, "fetch_vehicles"),
            OperationKey::FetchVehicleStatus { vin } => write!(f, "fetch_vehicle_status({})", vin),
            OperationKey::SendCommand { vin, command, .. } => {
                write!(f, "send_command({}, {})", vin, command)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_command_key_includes_payload() {
        let low = OperationKey::send_command("V1", &Command::SetChargeLimits { ac_percent: 80, dc_percent: 80 });
        let high = OperationKey::send_command("V1", &Command::SetChargeLimits { ac_percent: 100, dc_percent: 100 });
        let again = OperationKey::send_command("V1", &Command::SetChargeLimits { ac_percent: 80, dc_percent: 80 });

        assert_ne!(low, high);
        assert_eq!(low, again);
        assert_eq!(low.to_string(), "send_command(V1, set_charge_limits)");
    }

    #[test]
    fn test_keys_differ_by_vehicle() {
        assert_ne!(
            OperationKey::send_command("V1", &Command::Lock),
            OperationKey::send_command("V2", &Command::Lock)
        );
    }
}
