//! Canned story content.
//!
//! The fallback table answers for every reachable `(step, branch)` when the
//! generator is missing, slow, or talking nonsense. Lookups degrade from the
//! exact key, to the step's default entry, to one global segment, so they
//! never come back empty.

use crate::segment::{Branch, BranchKey, Outcome, Segment};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Deepest step the built-in table has content for.
pub const BUILTIN_DEPTH: u32 = 8;

static BUILTIN: Lazy<FallbackTable> = Lazy::new(FallbackTable::build_builtin);

/// Static content keyed by step and branch.
#[derive(Debug, Clone)]
pub struct FallbackTable {
    entries: HashMap<BranchKey, Segment>,
    global_default: Segment,
}

impl FallbackTable {
    /// Build a table from explicit entries and a global default.
    pub fn new(
        entries: impl IntoIterator<Item = (BranchKey, Segment)>,
        global_default: Segment,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            global_default,
        }
    }

    /// The shipped Trial of Fire table.
    pub fn builtin() -> &'static FallbackTable {
        &BUILTIN
    }

    /// The fixed opening segment (step 1).
    pub fn opening(&self) -> &Segment {
        self.lookup(BranchKey::new(1, None))
    }

    /// Resolve a key: exact entry, then the step's default, then the global
    /// default.
    pub fn lookup(&self, key: BranchKey) -> &Segment {
        self.entries
            .get(&key)
            .or_else(|| self.step_default(key.step))
            .unwrap_or(&self.global_default)
    }

    /// The default entry for a step: its branch-A entry, or the unbranched
    /// one for the opening step.
    pub fn step_default(&self, step: u32) -> Option<&Segment> {
        self.entries
            .get(&BranchKey::new(step, Some(Branch::A)))
            .or_else(|| self.entries.get(&BranchKey::new(step, None)))
    }

    pub fn global_default(&self) -> &Segment {
        &self.global_default
    }

    /// Whether every step from 1 to `max_steps` has its own content.
    pub fn covers(&self, max_steps: u32) -> bool {
        (1..=max_steps).all(|step| self.step_default(step).is_some())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn build_builtin() -> Self {
        let entries = BUILTIN_ENTRIES
            .iter()
            .map(|&(step, branch, narrative, option_a, option_b, outcome)| {
                (
                    BranchKey::new(step, branch),
                    Segment::new(narrative, option_a, option_b, outcome),
                )
            });

        Self::new(
            entries,
            Segment::new(
                "> SYSTEM ALERT: Signal interruption detected.\n\nYou stand in absolute silence. The cave offers no sound, no wind, no warning. Just stone. Still warm.\nYou feel the time slipping.\n\n\"INSTINCT IS A WEAPON.\"",
                "Move forward blindly",
                "Stay still and listen",
                Outcome::Continue,
            ),
        )
    }
}

type Entry = (u32, Option<Branch>, &'static str, &'static str, &'static str, Outcome);

const BUILTIN_ENTRIES: &[Entry] = &[
    (
        1,
        None,
        "> DANGER WARNING: Breath detected in the ash\n\nThe heat comes first. It bites. The ground cracks beneath you, pulsing with warmth. Stone groans. Above, faint flickers dance across the walls. Not flame, not light. Something older.\n\n\"You were not meant to wake yet.\"",
        "Walk toward the glow",
        "Turn toward the shadowed wall",
        Outcome::Continue,
    ),
    (
        2,
        Some(Branch::A),
        "> SYSTEM ALERT: Fire watching\n\nThe flame parts slightly where you walk, as if remembering you. It shapes symbols in the air. Jagged, slow-burning lines.\n\nAhead: a veil of fire. Beyond it, a figure stands still. Its arms are open.\n\n\"The flame will not lie. But it does not save.\"",
        "Step into the fire",
        "Approach the figure",
        Outcome::Continue,
    ),
    (
        2,
        Some(Branch::B),
        "> DANGER WARNING: The quiet is too still\n\nThe stone glows under your feet. Markings pulse on the walls. An old path, carved by older hands. Deeper in, a sunken chamber. No flame here. Only symbols, and something buried in the center. A mask made of bone.\n\n\"You've seen this before, but never held it.\"",
        "Put on the bone mask",
        "Follow the path of symbols",
        Outcome::Continue,
    ),
    (
        3,
        Some(Branch::A),
        "> SYSTEM NOTICE: Pain is proof\n\nYou pass through the fire. It takes your breath, your skin, almost your mind. But it lets you go. Behind you, the flames vanish like they were never there.\n\nBefore you, a split. One path rises, dry and humming with wind. The other falls, damp and whispering your name.",
        "Climb toward the wind",
        "Descend into the whisper",
        Outcome::Continue,
    ),
    (
        3,
        Some(Branch::B),
        "> SYSTEM ALERT: Something wears your face\n\nThe bone is cold against your skin. The walls stop glowing. In the dark, a shape crouches where the figure stood. It breathes when you breathe.\n\n\"Now it can see you too.\"",
        "Speak to the shape",
        "Tear the mask away",
        Outcome::Continue,
    ),
    (
        4,
        Some(Branch::A),
        "> WARNING: Symbols ahead\n\nAs you climb, the heat fades. Light blooms, amber and slow. At the top, a ledge of stone carved in spirals. Wind pulls at you from a crack above. Something scratches behind you. The shape followed.\n\n\"It only hunts what runs.\"",
        "Squeeze into the crack",
        "Turn and face the scratching",
        Outcome::Continue,
    ),
    (
        4,
        Some(Branch::B),
        "> DANGER WARNING: Water where there should be fire\n\nThe whisper becomes a voice. Cold water rises to your knees. It hisses where it touches the warm stone. Your torch, if you had one, would be gone now.\n\n\"Drown slowly, or burn fast.\"",
        "Wade deeper toward the voice",
        "Climb the wet rock",
        Outcome::Continue,
    ),
    (
        5,
        Some(Branch::A),
        "> SYSTEM NOTICE: The beast returns\n\nClaws on stone. Then silence. Ash drifts down from above where the crack widens. You can smell smoke and something green. Far away, maybe. Or very close.\n\n\"You feel like someone has already made this choice.\"",
        "Follow the smell of green",
        "Wait for the claws",
        Outcome::Continue,
    ),
    (
        5,
        Some(Branch::B),
        "> DANGER WARNING: Heat rising\n\nThe rock burns your palms. Below, the water boils. Markings you passed earlier glow again, brighter, in a line that leads sideways into the wall.\n\n\"The path remembers those who read it.\"",
        "Trace the glowing line",
        "Let go and drop",
        Outcome::Continue,
    ),
    (
        6,
        Some(Branch::A),
        "> SYSTEM ALERT: Two lights\n\nThe tunnel splits around a pillar of black glass. Left, a cold blue shimmer. Right, a red pulse like a heartbeat. The scratching stops. Something waits for you to choose.\n\n\"Instinct decides if you live.\"",
        "Go toward the blue",
        "Go toward the red",
        Outcome::Continue,
    ),
    (
        6,
        Some(Branch::B),
        "> SYSTEM NOTICE: Ember count low\n\nYou land hard. Heat presses from every side. A stone door stands half-buried in ash. Two objects lie before it, burned into the dust. A stone key. A blade of obsidian.\n\n\"You only get to choose once.\"",
        "Pick up the key",
        "Pick up the blade",
        Outcome::Continue,
    ),
    (
        7,
        Some(Branch::A),
        "> DANGER WARNING: The guardian stirs\n\nA gate of stone carved in spirals. A guardian stands before it. Not moving, not breathing. The shape from the dark stands behind you now. Close enough to touch.\n\n\"You're not sure if this is the first trial, or the last.\"",
        "Kneel before the guardian",
        "Push past it to the gate",
        Outcome::Continue,
    ),
    (
        7,
        Some(Branch::B),
        "> SYSTEM ALERT: The door hums\n\nThe stone door shakes. Dust pours from its seams. Through the gap, light. Behind you, the water is still rising, and it is not water anymore. It glows.\n\n\"Something inside you recognizes this path.\"",
        "Force the door open",
        "Hide from the rising glow",
        Outcome::Continue,
    ),
    (
        8,
        Some(Branch::A),
        "> SYSTEM RESPONSE: The gate knows\n\nThe guardian nods once and crumbles into ash. The gate opens, light pouring out like breath. Cool air. Sky.\n\nA voice behind the stone speaks: \"You remembered the first fire.\"",
        "Step into the light",
        "Look back one last time",
        Outcome::Escaped,
    ),
    (
        8,
        Some(Branch::B),
        "> SYSTEM FAILURE: Path corrupted\n\nThe ground opens. Heat floods your legs, then your chest. There is no pain. Only regret.\n\n\"You did not choose. You reacted.\"",
        "Fall in silence",
        "Reach for the light too late",
        Outcome::Death,
    ),
];
