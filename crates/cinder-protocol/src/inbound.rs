//! Messages decoded from clients.

use serde::{Deserialize, Serialize};

/// A decoded client-to-server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// First message on a connection.
    Login {
        /// Requested player name.
        username: String,
        /// Protocol version string the client speaks, e.g. `"1.16.5"`.
        version: String,
    },
    /// Player movement.
    Position {
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
        /// Z coordinate.
        z: f64,
        /// Yaw in degrees.
        yaw: f32,
        /// Pitch in degrees.
        pitch: f32,
        /// Whether the player stands on a block.
        on_ground: bool,
    },
    /// Client status command. Older versions fill `payload`, newer versions
    /// fill `action_id`; which one is read depends on the connection's
    /// capabilities.
    ClientCommand {
        /// Legacy payload field.
        payload: Option<i32>,
        /// Action id field.
        action_id: Option<i32>,
    },
    /// Chat line. A leading `/` marks a command.
    Chat {
        /// Raw text.
        message: String,
    },
}
