use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::duration::lilypond_duration;
use crate::error::DomainError;
use crate::notation::{Component, GraceContainer, Leaf, LeafKind, Voice};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    LilyPond,
    Json,
}

pub trait NotationExporter {
    fn export(&self, voice: &Voice, format: ExportFormat) -> Result<Vec<u8>, DomainError>;
}

pub struct JsonExporter;

impl NotationExporter for JsonExporter {
    fn export(&self, voice: &Voice, format: ExportFormat) -> Result<Vec<u8>, DomainError> {
        match format {
            ExportFormat::Json => serde_json::to_vec_pretty(voice)
                .map_err(|err| DomainError::Serialization(err.to_string())),
            other => Err(DomainError::validation(format!(
                "JsonExporter cannot handle {:?}",
                other
            ))),
        }
    }
}

/// Renders a voice as a LilyPond `\new Voice { .. }` expression.
pub struct LilyPondExporter;

impl LilyPondExporter {
    pub fn render(&self, voice: &Voice) -> Result<String, DomainError> {
        let mut out = String::from("\\new Voice {\n");
        render_components(&voice.components, 1, &mut out)?;
        out.push_str("}\n");
        Ok(out)
    }
}

impl NotationExporter for LilyPondExporter {
    fn export(&self, voice: &Voice, format: ExportFormat) -> Result<Vec<u8>, DomainError> {
        match format {
            ExportFormat::LilyPond => self.render(voice).map(String::into_bytes),
            other => Err(DomainError::validation(format!(
                "LilyPondExporter cannot handle {:?}",
                other
            ))),
        }
    }
}

fn render_components(
    components: &[Component],
    depth: usize,
    out: &mut String,
) -> Result<(), DomainError> {
    let indent = "    ".repeat(depth);
    for component in components {
        match component {
            Component::Leaf(leaf) => {
                if let Some(tempo) = &leaf.tempo {
                    writeln!(out, "{}{}", indent, tempo)?;
                }
                writeln!(out, "{}{}", indent, render_leaf(leaf)?)?;
            }
            Component::Tuplet(tuplet) => {
                writeln!(
                    out,
                    "{}\\tuplet {}/{} {{",
                    indent,
                    tuplet.multiplier.denom(),
                    tuplet.multiplier.numer()
                )?;
                render_components(&tuplet.components, depth + 1, out)?;
                writeln!(out, "{}}}", indent)?;
            }
        }
    }
    Ok(())
}

fn render_leaf(leaf: &Leaf) -> Result<String, DomainError> {
    let mut text = String::new();
    if let Some(grace) = &leaf.grace {
        text.push_str(&render_grace(grace)?);
        text.push(' ');
    }
    text.push_str(&render_kind(&leaf.kind));
    text.push_str(&lilypond_duration(leaf.written_duration)?);
    for attachment in &leaf.attachments {
        text.push(' ');
        text.push_str(attachment);
    }
    if leaf.tied && leaf.kind.is_pitched() {
        text.push_str(" ~");
    }
    Ok(text)
}

fn render_grace(grace: &GraceContainer) -> Result<String, DomainError> {
    let notes = grace
        .leaves
        .iter()
        .map(|leaf| -> Result<String, DomainError> {
            Ok(format!(
                "{}{}",
                render_kind(&leaf.kind),
                lilypond_duration(leaf.written_duration)?
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("\\grace {{ {} }}", notes.join(" ")))
}

fn render_kind(kind: &LeafKind) -> String {
    match kind {
        LeafKind::Note(pitch) => pitch.lilypond_name(),
        LeafKind::Chord(pitches) => {
            let names: Vec<String> = pitches.iter().map(|p| p.lilypond_name()).collect();
            format!("<{}>", names.join(" "))
        }
        LeafKind::Rest => "r".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duration::Duration;
    use crate::notation::Tuplet;
    use crate::pitch::Pitch;
    use crate::tempo::TempoMark;
    use num_rational::Ratio;

    fn sample_voice() -> Voice {
        let mut first = Leaf::new(LeafKind::Note(Pitch(0)), Duration::new(1, 4));
        first.tied = true;
        first.tempo = Some(TempoMark::quarter(60).unwrap());
        let mut graced = Leaf::new(LeafKind::Chord(vec![Pitch(0), Pitch(4)]), Duration::new(1, 8));
        graced.grace = Some(GraceContainer {
            leaves: vec![Leaf::new(LeafKind::Note(Pitch(2)), Duration::new(1, 16))],
        });
        let mut voice = Voice::new();
        voice.extend(vec![
            Component::Leaf(first),
            Component::Tuplet(Tuplet {
                multiplier: Ratio::new(2, 3),
                components: vec![
                    Component::Leaf(Leaf::new(LeafKind::Note(Pitch(0)), Duration::new(1, 8))),
                    Component::Leaf(Leaf::rest(Duration::new(1, 8))),
                    Component::Leaf(graced),
                ],
            }),
        ]);
        voice
    }

    #[test]
    fn renders_lilypond() {
        let output = LilyPondExporter.render(&sample_voice()).unwrap();
        let expected = "\\new Voice {\n    \\tempo 4 = 60\n    c'4 ~\n    \\tuplet 3/2 {\n        c'8\n        r8\n        \\grace { d'16 } <c' e'>8\n    }\n}\n";
        assert_eq!(output, expected);
    }

    #[test]
    fn attachments_follow_the_duration() {
        let mut leaf = Leaf::new(LeafKind::Note(Pitch(12)), Duration::new(1, 2));
        leaf.attachments = vec!["\\fermata".to_string()];
        leaf.tied = true;
        assert_eq!(render_leaf(&leaf).unwrap(), "c''2 \\fermata ~");
    }

    #[test]
    fn unwritable_tempo_mark_is_an_error() {
        let mut leaf = Leaf::new(LeafKind::Note(Pitch(0)), Duration::new(1, 4));
        leaf.tempo = Some(TempoMark {
            reference_duration: Duration::new(1, 3),
            units_per_minute: 60,
        });
        let mut voice = Voice::new();
        voice.extend(vec![Component::Leaf(leaf)]);
        assert!(matches!(
            LilyPondExporter.render(&voice),
            Err(DomainError::Format(_))
        ));
    }

    #[test]
    fn exports_json() {
        let bytes = JsonExporter
            .export(&sample_voice(), ExportFormat::Json)
            .unwrap();
        let output = String::from_utf8(bytes).unwrap();
        assert!(output.contains("\"tied\": true"));
    }

    #[test]
    fn exporters_reject_foreign_formats() {
        assert!(JsonExporter
            .export(&sample_voice(), ExportFormat::LilyPond)
            .is_err());
        assert!(LilyPondExporter
            .export(&sample_voice(), ExportFormat::Json)
            .is_err());
    }
}
