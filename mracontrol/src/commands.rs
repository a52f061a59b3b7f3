//! The zone command surface.

use crate::error::ControlError;

/// Parsed zone command.
#[derive(Clone, Debug, PartialEq)]
pub enum ZoneCommand {
    Play,
    Pause,
    Stop,
    QueuePlus,
    QueueMinus,
    /// Seek to an absolute position in seconds.
    Position(u64),
    /// Absolute volume, or a signed step when `relative` is set.
    Volume { value: i64, relative: bool },
    Shuffle(ShuffleArg),
    Repeat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShuffleArg {
    On,
    Off,
    Toggle,
}

impl ZoneCommand {
    /// Parses the textual command surface used by the upstream controller.
    ///
    /// Accepted forms: `play`, `pause`, `stop`, `queueplus`, `queueminus`,
    /// `position <sec>`, `volume <v>` / `volume +<n>` / `volume -<n>`,
    /// `volume_set <v>`, `shuffle on|off|toggle`, `repeat`.
    pub fn parse(command: &str, payload: Option<&str>) -> Result<ZoneCommand, ControlError> {
        let payload = payload.map(str::trim);
        match command {
            "play" => Ok(ZoneCommand::Play),
            "pause" => Ok(ZoneCommand::Pause),
            "stop" => Ok(ZoneCommand::Stop),
            "queueplus" => Ok(ZoneCommand::QueuePlus),
            "queueminus" => Ok(ZoneCommand::QueueMinus),
            "position" => {
                let seconds = payload
                    .and_then(|p| p.parse::<u64>().ok())
                    .ok_or_else(|| ControlError::InvalidCommand("position needs seconds".into()))?;
                Ok(ZoneCommand::Position(seconds))
            }
            "volume" | "volume_set" => {
                let raw = payload
                    .ok_or_else(|| ControlError::InvalidCommand("volume needs a value".into()))?;
                let relative = command == "volume"
                    && (raw.starts_with('+') || raw.starts_with('-'));
                let value = raw
                    .parse::<i64>()
                    .map_err(|_| ControlError::InvalidCommand(format!("bad volume '{raw}'")))?;
                Ok(ZoneCommand::Volume { value, relative })
            }
            "shuffle" => {
                let arg = match payload {
                    Some("on") => ShuffleArg::On,
                    Some("off") => ShuffleArg::Off,
                    Some("toggle") | None => ShuffleArg::Toggle,
                    Some(other) => {
                        return Err(ControlError::InvalidCommand(format!(
                            "bad shuffle arg '{other}'"
                        )));
                    }
                };
                Ok(ZoneCommand::Shuffle(arg))
            }
            "repeat" => Ok(ZoneCommand::Repeat),
            other => Err(ControlError::InvalidCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(ZoneCommand::parse("play", None).unwrap(), ZoneCommand::Play);
        assert_eq!(
            ZoneCommand::parse("position", Some("42")).unwrap(),
            ZoneCommand::Position(42)
        );
        assert_eq!(
            ZoneCommand::parse("shuffle", Some("on")).unwrap(),
            ZoneCommand::Shuffle(ShuffleArg::On)
        );
        assert!(ZoneCommand::parse("warp", None).is_err());
    }

    #[test]
    fn test_parse_volume_forms() {
        assert_eq!(
            ZoneCommand::parse("volume", Some("30")).unwrap(),
            ZoneCommand::Volume {
                value: 30,
                relative: false
            }
        );
        assert_eq!(
            ZoneCommand::parse("volume", Some("+5")).unwrap(),
            ZoneCommand::Volume {
                value: 5,
                relative: true
            }
        );
        assert_eq!(
            ZoneCommand::parse("volume", Some("-5")).unwrap(),
            ZoneCommand::Volume {
                value: -5,
                relative: true
            }
        );
        // volume_set is always absolute.
        assert_eq!(
            ZoneCommand::parse("volume_set", Some("50")).unwrap(),
            ZoneCommand::Volume {
                value: 50,
                relative: false
            }
        );
    }
}
