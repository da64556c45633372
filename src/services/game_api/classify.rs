use crate::config::Identity;
use crate::kernel::event::EventKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: EventKind,
    /// The acting party (attacker, achiever, crasher). `None` for system lines.
    pub actor: Option<String>,
}

/// Verbs that split a HUD line into "<actor> <verb> <victim>". Checked in order; the first
/// one present wins.
const VERBS: &[(&str, EventKind)] = &[
    ("has crashed", EventKind::Crashed),
    ("has achieved", EventKind::Achievement),
    ("has delivered", EventKind::Achievement),
    ("set afire", EventKind::EnemySetAfire),
    ("severely damaged", EventKind::SeverelyDamaged),
    ("shot down", EventKind::ShotDown),
    ("has been wrecked", EventKind::TargetDestroyed),
    ("destroyed", EventKind::TargetDestroyed),
];

/// Maps one raw HUD damage-feed line onto an event kind. Anything that matches no known verb
/// is treated as chat.
pub fn classify(msg: &str, identity: &Identity) -> Classified {
    if msg.contains("Engine overheated") {
        return Classified {
            kind: EventKind::EngineOverheat,
            actor: None,
        };
    }
    if msg.contains("Oil overheated") {
        return Classified {
            kind: EventKind::OilOverheated,
            actor: None,
        };
    }

    for (verb, kind) in VERBS {
        let Some((before, after)) = msg.split_once(verb) else {
            continue;
        };
        let actor = before.trim();
        let victim = after.trim();
        let actor = (!actor.is_empty()).then(|| actor.to_string());

        // Fire works both ways: the player can be the one burning.
        let kind = if *kind == EventKind::EnemySetAfire && identity.is_self(victim) {
            EventKind::TakingDamage
        } else {
            *kind
        };
        return Classified { kind, actor };
    }

    Classified {
        kind: EventKind::ChatMessage,
        actor: None,
    }
}
