//! MCP tool definitions
//!
//! Descriptions are written for the calling model: they say when to reach
//! for each tool and what comes back.

use super::protocol::Tool;

pub const INVENTORY_NAMES: &str = "get_device_inventory_names";
pub const DEVICE_ATTRIBUTES: &str = "get_device_attributes";
pub const EXEC_CLI_COMMANDS: &str = "exec_cli_commands_in_device";

pub fn get_tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: INVENTORY_NAMES.into(),
            description: "Returns the names of the devices onboarded in the remote service's \
                inventory, rendered as a set (e.g. {\"p0-2e\", \"p1-2e\"}). Use this first when \
                the user asks about \"devices\", \"network\" or \"all devices\"."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        },
        Tool {
            name: DEVICE_ATTRIBUTES.into(),
            description: "Returns a JSON object with the attributes of one device: name, host, \
                device_type, description, terminal_config, netconf_config, snmp_version, \
                swagger_config, http_config, forwarded_tcp_ports and terminal_capabilities. \
                Try this first when the user asks about a specific device. Safe to call \
                concurrently for several devices."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "target_device": {
                        "type": "string",
                        "description": "Device name as onboarded in the inventory"
                    }
                },
                "required": ["target_device"]
            }),
        },
        Tool {
            name: EXEC_CLI_COMMANDS.into(),
            description: "Executes one or more CLI commands on a device, in order, and returns \
                the raw output as text. Pick commands that suit the device type (for Cisco IOS, \
                e.g. \"show version\"). Multiple commands must be safe to run sequentially. Use \
                only when get_device_attributes lacks the information or the user explicitly \
                asks to run a command. An \"Access denied\" failure means the server's identity \
                lacks the RBAC tag for this device."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "target_device": {
                        "type": "string",
                        "description": "Device name as onboarded in the inventory"
                    },
                    "cli_commands": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "description": "Commands to run, in submission order"
                    }
                },
                "required": ["target_device", "cli_commands"]
            }),
        },
    ]
}

pub fn is_known_tool(name: &str) -> bool {
    matches!(name, INVENTORY_NAMES | DEVICE_ATTRIBUTES | EXEC_CLI_COMMANDS)
}
