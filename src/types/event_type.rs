//! Semantic event types used to index and dispatch sequences

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic type of an event sequence
///
/// Well-known engine signals get their own variant; anything else authored by
/// content designers is kept verbatim in [`EventType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventType {
    /// Plain callable event with no automatic trigger
    Common,
    /// Runs once, immediately, when registered
    Autorun,
    KeyDown,
    KeyUp,
    MouseDown,
    MouseUp,
    MouseMove,
    DoubleClick,
    Wheel,
    TouchStart,
    TouchMove,
    TouchEnd,
    GamepadButtonPress,
    GamepadButtonRelease,
    GamepadLeftStickChange,
    GamepadRightStickChange,
    EquipmentGain,
    ItemGain,
    MoneyGain,
    Startup,
    CreateScene,
    LoadScene,
    LoadSave,
    ShowText,
    ShowChoices,
    Preload,
    /// Entity created
    Create,
    /// Entity loaded from a save
    Load,
    /// Per-frame entity update
    Update,
    /// Entity destroyed
    Destroy,
    Collision,
    SkillCast,
    SkillAdd,
    SkillRemove,
    StateAdd,
    StateRemove,
    EquipmentAdd,
    EquipmentRemove,
    ItemUse,
    /// Designer-defined type
    Custom(String),
}

const NAMED: &[(&str, EventType)] = &[
    ("common", EventType::Common),
    ("autorun", EventType::Autorun),
    ("keydown", EventType::KeyDown),
    ("keyup", EventType::KeyUp),
    ("mousedown", EventType::MouseDown),
    ("mouseup", EventType::MouseUp),
    ("mousemove", EventType::MouseMove),
    ("doubleclick", EventType::DoubleClick),
    ("wheel", EventType::Wheel),
    ("touchstart", EventType::TouchStart),
    ("touchmove", EventType::TouchMove),
    ("touchend", EventType::TouchEnd),
    ("gamepadbuttonpress", EventType::GamepadButtonPress),
    ("gamepadbuttonrelease", EventType::GamepadButtonRelease),
    ("gamepadleftstickchange", EventType::GamepadLeftStickChange),
    ("gamepadrightstickchange", EventType::GamepadRightStickChange),
    ("equipmentgain", EventType::EquipmentGain),
    ("itemgain", EventType::ItemGain),
    ("moneygain", EventType::MoneyGain),
    ("startup", EventType::Startup),
    ("createscene", EventType::CreateScene),
    ("loadscene", EventType::LoadScene),
    ("loadsave", EventType::LoadSave),
    ("showtext", EventType::ShowText),
    ("showchoices", EventType::ShowChoices),
    ("preload", EventType::Preload),
    ("create", EventType::Create),
    ("load", EventType::Load),
    ("update", EventType::Update),
    ("destroy", EventType::Destroy),
    ("collision", EventType::Collision),
    ("skillcast", EventType::SkillCast),
    ("skilladd", EventType::SkillAdd),
    ("skillremove", EventType::SkillRemove),
    ("stateadd", EventType::StateAdd),
    ("stateremove", EventType::StateRemove),
    ("equipmentadd", EventType::EquipmentAdd),
    ("equipmentremove", EventType::EquipmentRemove),
    ("itemuse", EventType::ItemUse),
];

impl EventType {
    /// Canonical lowercase name
    pub fn as_str(&self) -> &str {
        if let Self::Custom(name) = self {
            return name;
        }
        NAMED
            .iter()
            .find(|(_, ty)| ty == self)
            .map(|(name, _)| *name)
            .unwrap_or("custom")
    }

    /// Whether occurrences of this type come from input devices.
    ///
    /// Only input dispatches consult the stop-propagation channel.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Self::KeyDown
                | Self::KeyUp
                | Self::MouseDown
                | Self::MouseUp
                | Self::MouseMove
                | Self::DoubleClick
                | Self::Wheel
                | Self::TouchStart
                | Self::TouchMove
                | Self::TouchEnd
                | Self::GamepadButtonPress
                | Self::GamepadButtonRelease
                | Self::GamepadLeftStickChange
                | Self::GamepadRightStickChange
        )
    }

    /// Script capability this type is delivered to, if any
    pub fn script_method(&self) -> Option<ScriptMethod> {
        use ScriptMethod as M;
        let method = match self {
            Self::Autorun => M::OnStart,
            Self::Create => M::OnCreate,
            Self::Load => M::OnLoad,
            Self::Update => M::Update,
            Self::Destroy => M::OnDestroy,
            Self::Collision => M::OnCollision,
            Self::SkillCast => M::OnSkillCast,
            Self::SkillAdd => M::OnSkillAdd,
            Self::SkillRemove => M::OnSkillRemove,
            Self::StateAdd => M::OnStateAdd,
            Self::StateRemove => M::OnStateRemove,
            Self::EquipmentAdd => M::OnEquipmentAdd,
            Self::EquipmentRemove => M::OnEquipmentRemove,
            Self::ItemUse => M::OnItemUse,
            Self::KeyDown => M::OnKeyDown,
            Self::KeyUp => M::OnKeyUp,
            Self::MouseDown => M::OnMouseDown,
            Self::MouseUp => M::OnMouseUp,
            Self::MouseMove => M::OnMouseMove,
            Self::DoubleClick => M::OnDoubleClick,
            Self::Wheel => M::OnWheel,
            Self::TouchStart => M::OnTouchStart,
            Self::TouchMove => M::OnTouchMove,
            Self::TouchEnd => M::OnTouchEnd,
            Self::GamepadButtonPress => M::OnGamepadButtonPress,
            Self::GamepadButtonRelease => M::OnGamepadButtonRelease,
            Self::GamepadLeftStickChange => M::OnGamepadLeftStickChange,
            Self::GamepadRightStickChange => M::OnGamepadRightStickChange,
            Self::Startup => M::OnStartup,
            Self::CreateScene => M::OnSceneCreate,
            Self::LoadScene => M::OnSceneLoad,
            Self::LoadSave => M::OnSaveLoad,
            Self::Preload => M::OnPreload,
            Self::Common
            | Self::EquipmentGain
            | Self::ItemGain
            | Self::MoneyGain
            | Self::ShowText
            | Self::ShowChoices
            | Self::Custom(_) => return None,
        };
        Some(method)
    }
}

/// Optional methods an attached script behavior may implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptMethod {
    Update,
    OnStart,
    OnCreate,
    OnLoad,
    OnDestroy,
    OnCollision,
    OnSkillCast,
    OnSkillAdd,
    OnSkillRemove,
    OnStateAdd,
    OnStateRemove,
    OnEquipmentAdd,
    OnEquipmentRemove,
    OnItemUse,
    OnKeyDown,
    OnKeyUp,
    OnMouseDown,
    OnMouseUp,
    OnMouseMove,
    OnDoubleClick,
    OnWheel,
    OnTouchStart,
    OnTouchMove,
    OnTouchEnd,
    OnGamepadButtonPress,
    OnGamepadButtonRelease,
    OnGamepadLeftStickChange,
    OnGamepadRightStickChange,
    OnStartup,
    OnSceneCreate,
    OnSceneLoad,
    OnSaveLoad,
    OnPreload,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(NAMED
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, ty)| ty.clone())
            .unwrap_or_else(|| EventType::Custom(s.to_string())))
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(ty) => ty,
            Err(never) => match never {},
        }
    }
}

impl TryFrom<String> for EventType {
    type Error = std::convert::Infallible;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EventType> for String {
    fn from(ty: EventType) -> Self {
        ty.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_types_parse_and_print() {
        assert_eq!(EventType::from("keydown"), EventType::KeyDown);
        assert_eq!(EventType::KeyDown.to_string(), "keydown");
        assert_eq!(EventType::from("autorun"), EventType::Autorun);
    }

    #[test]
    fn unknown_names_become_custom() {
        let ty = EventType::from("independent");
        assert_eq!(ty, EventType::Custom("independent".to_string()));
        assert_eq!(ty.as_str(), "independent");
        assert_eq!(ty.script_method(), None);
    }

    #[test]
    fn input_types_are_flagged() {
        assert!(EventType::MouseDown.is_input());
        assert!(EventType::GamepadLeftStickChange.is_input());
        assert!(!EventType::Startup.is_input());
        assert!(!EventType::Custom("keydown2".into()).is_input());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&EventType::LoadScene).unwrap();
        assert_eq!(json, "\"loadscene\"");
        let back: EventType = serde_json::from_str("\"skillcast\"").unwrap();
        assert_eq!(back, EventType::SkillCast);
    }
}
