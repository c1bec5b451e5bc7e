//! Interactive editing loop over a [`DocumentSession`]
//!
//! Each input line is one command. The draft is edited in place, previewed on
//! demand and committed to the history; `save` exports the committed history.

use crate::commands::write_artifact;
use anyhow::Context;
use pdfstamp_core::{
    page_box, DocumentSession, FontReference, PageRasterizer, Point, Rgb, StampError, StandardFont,
};
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;

const HELP: &str = "\
commands:
  text <text>        set the draft text (\\n starts a new line)
  page <n>           move the draft to page n
  at <x> <y>         place the draft, top-left origin, y downward
  font <name>        choose a configured font or a standard family
  size <points>      font size
  spacing <factor>   line spacing, 0.8 to 3.0
  color <#RRGGBB>    text colour
  commit             add the draft to the history
  undo               remove the newest entry
  remove <n>         remove entry n as shown by `list`
  list               show the draft and the history
  preview [path]     render the draft's page to PNG
  save [path]        export the annotated PDF
  history [path]     write the history as JSON for `pdfstamp annotate`
  help               show this text
  quit               leave the editor";

const MIN_SPACING: f64 = 0.8;
const MAX_SPACING: f64 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    Text(String),
    Page(usize),
    At(f64, f64),
    Font(String),
    Size(f64),
    Spacing(f64),
    Color(String),
    Commit,
    Undo,
    Remove(usize),
    List,
    Preview(Option<PathBuf>),
    Save(Option<PathBuf>),
    History(Option<PathBuf>),
    Help,
    Quit,
}

fn number<T: std::str::FromStr>(value: &str, what: &str) -> anyhow::Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{} expects a number, got '{}'", what, value.trim()))
}

fn optional_path(rest: &str) -> Option<PathBuf> {
    let rest = rest.trim();
    (!rest.is_empty()).then(|| PathBuf::from(rest))
}

impl EditCommand {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let (name, rest) = trimmed.split_once(' ').unwrap_or((trimmed, ""));

        let command = match name {
            "text" => EditCommand::Text(rest.replace("\\n", "\n")),
            "page" => EditCommand::Page(number(rest, "page")?),
            "at" => {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                let [x, y] = parts.as_slice() else {
                    anyhow::bail!("at expects two coordinates");
                };
                EditCommand::At(number(x, "at")?, number(y, "at")?)
            }
            "font" if !rest.trim().is_empty() => EditCommand::Font(rest.trim().to_string()),
            "font" => anyhow::bail!("font expects a name"),
            "size" => EditCommand::Size(number(rest, "size")?),
            "spacing" => EditCommand::Spacing(number(rest, "spacing")?),
            "color" | "colour" => EditCommand::Color(rest.trim().to_string()),
            "commit" => EditCommand::Commit,
            "undo" => EditCommand::Undo,
            "remove" => EditCommand::Remove(number(rest, "remove")?),
            "list" => EditCommand::List,
            "preview" => EditCommand::Preview(optional_path(rest)),
            "save" => EditCommand::Save(optional_path(rest)),
            "history" => EditCommand::History(optional_path(rest)),
            "help" | "?" => EditCommand::Help,
            "quit" | "exit" => EditCommand::Quit,
            other => anyhow::bail!("unknown command '{}', try `help`", other),
        };
        Ok(Some(command))
    }
}

/// Outcome of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Run commands from `input` until `quit` or end of input
pub fn run<R: BufRead, W: Write>(
    session: &mut DocumentSession,
    rasterizer: Option<&dyn PageRasterizer>,
    input: R,
    out: &mut W,
) -> anyhow::Result<()> {
    writeln!(
        out,
        "Editing {} ({} pages, previews at {} dpi). Type `help` for commands.",
        session.name(),
        session.page_count(),
        session.config().preview_dpi
    )?;

    for line in input.lines() {
        let line = line.context("Failed to read command")?;
        let command = match EditCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                writeln!(out, "error: {}", e)?;
                continue;
            }
        };
        match execute(session, rasterizer, command, out) {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(e) => match e.downcast_ref::<StampError>() {
                Some(stamp) if stamp.is_render_fatal() => {
                    writeln!(out, "error: render aborted, nothing written: {}", stamp)?
                }
                _ => writeln!(out, "error: {:#}", e)?,
            },
        }
    }
    Ok(())
}

fn execute<W: Write>(
    session: &mut DocumentSession,
    rasterizer: Option<&dyn PageRasterizer>,
    command: EditCommand,
    out: &mut W,
) -> anyhow::Result<Flow> {
    match command {
        EditCommand::Text(text) => session.draft_mut().text = text,
        EditCommand::Page(page) => {
            if page == 0 || page > session.page_count() {
                anyhow::bail!("page must be between 1 and {}", session.page_count());
            }
            session.draft_mut().page_index = page - 1;
        }
        EditCommand::At(x, y) => {
            // origins live in the unrotated box
            let visible = page_box(&session.base_bytes(), session.draft().page_index)?;
            let (width, height) = (visible.width, visible.height);
            let origin = Point::new(x.clamp(0.0, width), y.clamp(0.0, height));
            if origin != Point::new(x, y) {
                writeln!(
                    out,
                    "clamped to ({}, {}) on a {}x{} page",
                    origin.x, origin.y, width, height
                )?;
            }
            session.draft_mut().origin = origin;
        }
        EditCommand::Font(name) => {
            let reference = if session.fonts().source(&name).is_some() {
                FontReference::named(name)
            } else {
                let standard = StandardFont::from_family(&name);
                writeln!(
                    out,
                    "'{}' is not configured, using {}",
                    name,
                    standard.base_font()
                )?;
                FontReference::Builtin(standard)
            };
            session.draft_mut().font = Some(reference);
        }
        EditCommand::Size(size) => {
            if !(size.is_finite() && size > 0.0) {
                anyhow::bail!("size must be positive");
            }
            session.draft_mut().font_size = size;
        }
        EditCommand::Spacing(spacing) => {
            if !spacing.is_finite() {
                anyhow::bail!("spacing must be a number");
            }
            session.draft_mut().line_spacing = spacing.clamp(MIN_SPACING, MAX_SPACING);
        }
        EditCommand::Color(hex) => session.draft_mut().color = Rgb::from_hex(&hex)?,
        EditCommand::Commit => match session.commit()? {
            Some(index) => writeln!(out, "committed entry {}", index + 1)?,
            None => writeln!(
                out,
                "nothing to commit: the draft needs text and an available font"
            )?,
        },
        EditCommand::Undo => match session.undo() {
            Some(op) => writeln!(out, "removed {:?}", op.text)?,
            None => writeln!(out, "history is empty")?,
        },
        EditCommand::Remove(number) => {
            let index = number
                .checked_sub(1)
                .context("entries are numbered from 1")?;
            let op = session.remove(index)?;
            writeln!(out, "removed {:?}", op.text)?;
        }
        EditCommand::List => list(session, out)?,
        EditCommand::Preview(path) => {
            let rasterizer = rasterizer
                .context("previews need a build with the `pdfium` feature")?;
            let page = session.preview(rasterizer)?;
            let path = path.unwrap_or_else(|| PathBuf::from("preview.png"));
            fs::write(&path, &page.png)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            writeln!(
                out,
                "page {} at {} dpi written to {}",
                page.page_index + 1,
                page.dpi,
                path.display()
            )?;
        }
        EditCommand::Save(path) => {
            let artifact = session.export()?;
            let path = write_artifact(&artifact, path.as_deref())?;
            writeln!(
                out,
                "saved {} entries to {}",
                session.history().len(),
                path.display()
            )?;
        }
        EditCommand::History(path) => {
            let path = path.unwrap_or_else(|| PathBuf::from("history.json"));
            fs::write(&path, session.history().to_json()?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            writeln!(out, "history written to {}", path.display())?;
        }
        EditCommand::Help => writeln!(out, "{}", HELP)?,
        EditCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn list<W: Write>(session: &DocumentSession, out: &mut W) -> anyhow::Result<()> {
    let draft = session.draft();
    writeln!(
        out,
        "draft: page {} at ({}, {}) {} {}pt x{} {} {:?}",
        draft.page_index + 1,
        draft.origin.x,
        draft.origin.y,
        draft
            .font
            .as_ref()
            .map(FontReference::display_name)
            .unwrap_or("<no font>"),
        draft.font_size,
        draft.line_spacing,
        draft.color.to_hex(),
        draft.text
    )?;
    if session.history().is_empty() {
        writeln!(out, "history is empty")?;
    } else {
        writeln!(
            out,
            "{} entries, {} on page {}",
            session.history().len(),
            session
                .history()
                .operations_for_page(draft.page_index)
                .len(),
            draft.page_index + 1
        )?;
    }
    for (index, op) in session.entries() {
        writeln!(
            out,
            "{}. page {} at ({}, {}) {} {:?}",
            index + 1,
            op.page_index + 1,
            op.origin.x,
            op.origin.y,
            op.font.display_name(),
            op.text
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object};
    use pdfstamp_core::{FontCatalog, SessionConfig};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn blank_pdf(num_pages: usize) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..num_pages)
            .map(|_| {
                Object::Reference(doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 200.into(), 300.into()],
                }))
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => num_pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn session() -> DocumentSession {
        DocumentSession::new(
            "blank.pdf",
            blank_pdf(2),
            FontCatalog::new(),
            SessionConfig::default(),
        )
        .unwrap()
    }

    fn run_script(session: &mut DocumentSession, script: &str) -> String {
        let mut out = Vec::new();
        run(session, None, Cursor::new(script), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            EditCommand::parse("text Hello\\nWorld").unwrap(),
            Some(EditCommand::Text("Hello\nWorld".to_string()))
        );
        assert_eq!(
            EditCommand::parse("at 10 20.5").unwrap(),
            Some(EditCommand::At(10.0, 20.5))
        );
        assert_eq!(
            EditCommand::parse("save out.pdf").unwrap(),
            Some(EditCommand::Save(Some(PathBuf::from("out.pdf"))))
        );
        assert_eq!(
            EditCommand::parse("preview").unwrap(),
            Some(EditCommand::Preview(None))
        );
        assert_eq!(EditCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_banner_reports_session_settings() {
        let mut s = DocumentSession::new(
            "blank.pdf",
            blank_pdf(3),
            FontCatalog::new(),
            SessionConfig {
                preview_dpi: 72.0,
                ..SessionConfig::default()
            },
        )
        .unwrap();
        let output = run_script(&mut s, "quit\n");
        assert!(output.starts_with("Editing blank.pdf (3 pages, previews at 72 dpi)."));
    }

    #[test]
    fn test_parse_errors() {
        assert!(EditCommand::parse("at 10").is_err());
        assert!(EditCommand::parse("size big").is_err());
        assert!(EditCommand::parse("font").is_err());
        assert!(EditCommand::parse("frobnicate").is_err());
    }

    #[test]
    fn test_commit_undo_remove_flow() {
        let mut s = session();
        let output = run_script(
            &mut s,
            concat!(
                "text first\ncommit\npage 2\ntext second\ncommit\n",
                "text third\ncommit\nundo\nremove 1\nlist\n",
            ),
        );
        assert!(output.contains("committed entry 3"));
        assert!(output.contains("removed \"third\""));
        assert!(output.contains("removed \"first\""));
        assert_eq!(s.history().len(), 1);
        assert_eq!(s.history().snapshot()[0].text, "second");
        assert_eq!(s.history().snapshot()[0].page_index, 1);
    }

    #[test]
    fn test_empty_draft_commit_is_reported() {
        let mut s = session();
        let output = run_script(&mut s, "commit\n");
        assert!(output.contains("nothing to commit"));
        assert!(s.history().is_empty());
    }

    #[test]
    fn test_errors_do_not_stop_the_loop() {
        let mut s = session();
        let output = run_script(&mut s, "page 9\nremove 4\ncolor blue\ntext ok\ncommit\n");
        assert_eq!(output.matches("error:").count(), 3);
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_position_is_clamped_to_page() {
        let mut s = session();
        let output = run_script(&mut s, "at 500 -5\n");
        assert!(output.contains("clamped"));
        assert_eq!(s.draft().origin, Point::new(200.0, 0.0));
    }

    #[test]
    fn test_settings_update_draft() {
        let mut s = session();
        run_script(&mut s, "size 12\nspacing 9\ncolor #0000FF\nfont courier\n");
        let draft = s.draft();
        assert_eq!(draft.font_size, 12.0);
        assert_eq!(draft.line_spacing, MAX_SPACING);
        assert_eq!(draft.color, Rgb::new(0.0, 0.0, 1.0));
        assert_eq!(
            draft.font,
            Some(FontReference::Builtin(StandardFont::Courier))
        );
    }

    #[test]
    fn test_preview_without_rasterizer_is_an_error() {
        let mut s = session();
        let output = run_script(&mut s, "text hi\npreview\n");
        assert!(output.contains("pdfium"));
    }

    #[test]
    fn test_history_file_round_trips() {
        let mut s = session();
        let path = std::env::temp_dir()
            .join(format!("pdfstamp-history-{}.json", std::process::id()));
        run_script(
            &mut s,
            &format!("text kept\ncommit\nhistory {}\n", path.display()),
        );
        let json = fs::read_to_string(&path).unwrap();
        fs::remove_file(&path).unwrap();
        let restored = pdfstamp_core::AnnotationHistory::from_json(&json).unwrap();
        assert_eq!(&restored, s.history());
    }

    #[test]
    fn test_quit_stops_reading() {
        let mut s = session();
        run_script(&mut s, "quit\ntext late\ncommit\n");
        assert!(s.history().is_empty());
    }
}
