//! Options a client sends when creating or joining a room.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::RoomCode;

/// Join handshake options.
///
/// Every field except `name` and `protocol` is optional on the wire.
/// Player-supplied fields of the wrong JSON type read as their default, so
/// a `null` name is rejected as too short and a non-integer protocol as a
/// mismatch. Version `0` never matches a server. `credential` and
/// `roomCode` stay strict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOptions {
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,

    #[serde(default, deserialize_with = "lenient")]
    pub protocol: u32,

    /// Account credential. Anonymous when absent.
    #[serde(default)]
    pub credential: Option<Credential>,

    /// Requested visibility of a newly created room.
    #[serde(default, deserialize_with = "lenient")]
    pub public: bool,

    /// Join this room instead of creating one.
    #[serde(default)]
    pub room_code: Option<RoomCode>,

    /// Initial gameplay settings for a newly created room. Values of any
    /// JSON type are stored in their string form.
    #[serde(default, deserialize_with = "lenient")]
    pub gameplay_settings: BTreeMap<String, Value>,

    #[serde(default, deserialize_with = "lenient")]
    pub skin: Skin,

    /// Arrow colours as the player sees their own lane.
    #[serde(default, deserialize_with = "lenient")]
    pub arrow_colors: [i64; 4],

    /// Arrow colours used for the opponent's lane.
    #[serde(default, deserialize_with = "lenient")]
    pub arrow_colors_opponent: [i64; 4],

    /// Client-reported points. Ignored for verified accounts.
    #[serde(default, deserialize_with = "lenient")]
    pub points: Option<i64>,
}

/// Reads a field, falling back to its default when the value has the wrong
/// JSON type.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Account id plus a signed token issued by the account service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub account_id: String,
    pub token: String,
}

/// Reference to a cosmetic skin. All parts are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_options_defaults_when_fields_missing() {
        let opts: JoinOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(opts.name, "");
        assert_eq!(opts.protocol, 0);
        assert!(!opts.public);
        assert!(opts.credential.is_none());
        assert_eq!(opts.arrow_colors, [0; 4]);
    }

    #[test]
    fn test_join_options_parses_camel_case_fields() {
        let opts: JoinOptions = serde_json::from_value(json!({
            "name": "bob",
            "protocol": 3,
            "public": true,
            "roomCode": "ABCD",
            "credential": {"accountId": "acc-1", "token": "t.o.k"},
            "gameplaySettings": {"scrollSpeed": 2.5, "ghostTapping": true},
            "skin": {"modDir": "mods/x", "name": "bf"},
            "arrowColors": [1, 2, 3, 4],
            "arrowColorsOpponent": [5, 6, 7, 8],
            "points": 120
        }))
        .unwrap();

        assert_eq!(opts.room_code, Some(RoomCode::from("ABCD")));
        assert_eq!(opts.credential.unwrap().account_id, "acc-1");
        assert_eq!(opts.gameplay_settings["scrollSpeed"], json!(2.5));
        assert_eq!(opts.skin.mod_dir.as_deref(), Some("mods/x"));
        assert!(opts.skin.url.is_none());
        assert_eq!(opts.arrow_colors_opponent, [5, 6, 7, 8]);
        assert_eq!(opts.points, Some(120));
    }

    #[test]
    fn test_join_options_wrong_types_fall_back_to_defaults() {
        let opts: JoinOptions = serde_json::from_value(json!({
            "name": null,
            "protocol": "0.9",
            "public": "yes",
            "arrowColors": "red",
            "arrowColorsOpponent": [1, 2],
            "points": {"n": 3},
            "skin": 7
        }))
        .unwrap();
        assert_eq!(opts.name, "");
        assert_eq!(opts.protocol, 0);
        assert!(!opts.public);
        assert_eq!(opts.arrow_colors, [0; 4]);
        assert_eq!(opts.arrow_colors_opponent, [0; 4]);
        assert_eq!(opts.points, None);
        assert_eq!(opts.skin, Skin::default());
    }

    #[test]
    fn test_join_options_fractional_protocol_reads_as_zero() {
        let opts: JoinOptions =
            serde_json::from_value(json!({"name": "alice", "protocol": 1.5})).unwrap();
        assert_eq!(opts.protocol, 0);
    }

    #[test]
    fn test_join_options_malformed_credential_is_an_error() {
        let result: Result<JoinOptions, _> =
            serde_json::from_value(json!({"name": "alice", "credential": "token"}));
        assert!(result.is_err());
    }
}
