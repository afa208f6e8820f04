//! The interactive command set.
//!
//! A [`Shell`] owns one [`Context`] and at most one loaded [`FileReader`].
//! Each input line is split with [`split_command_line`], parsed with clap and
//! dispatched to a handler that writes its result to the shell's output.
//! Failures are reported as text; no command ends the session except `exit`.

use std::cell::RefCell;
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use regex::Regex;
use tracing::debug;

use cmo_format::{CmoError, Context, ContextOptions, EncodingList, FileReader, FileWriter};

use crate::format::{self, ListStyle};
use crate::tokenize::split_command_line;

/// Whether the read loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Parser)]
#[command(
    name = "unvirt",
    no_binary_name = true,
    disable_help_subcommand = true,
    disable_version_flag = true,
    override_usage = "<COMMAND> [ARGS]..."
)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Debug, Subcommand)]
enum ShellCommand {
    /// Load a file. A deep load also creates live objects.
    Load {
        #[arg(value_enum)]
        stage: LoadStage,
        path: PathBuf,
    },
    /// Close the loaded file and clear the context.
    Unload,
    /// Save the loaded file to a new path.
    Save { path: PathBuf },
    /// Show the header of the loaded file.
    Info,
    /// List objects, managers or the last search result. Pages start at 1.
    Ls {
        #[arg(value_enum)]
        part: ListPart,
        page: NonZeroUsize,
    },
    /// Show the live object or manager of an entry.
    Data {
        #[arg(value_enum)]
        part: Part,
        index: usize,
    },
    /// Show the state chunk of an entry.
    Chunk {
        #[arg(value_enum)]
        part: Part,
        index: usize,
    },
    /// Search entry names by substring or regular expression.
    Search {
        #[arg(value_enum)]
        part: Part,
        #[arg(value_enum)]
        mode: SearchMode,
        text: String,
    },
    /// Set the number of entries per page.
    Items { count: NonZeroUsize },
    /// Choose between full and simple list columns.
    Style {
        #[arg(value_enum)]
        level: StyleLevel,
    },
    /// Set the encodings used for names, tried in order.
    Encoding {
        #[arg(required = true, num_args = 1.., value_delimiter = ',')]
        names: Vec<String>,
    },
    /// Set the folder receiving extracted included files.
    Temp { path: PathBuf },
    /// Manage folders searched for external resources.
    Rsc {
        #[command(subcommand)]
        action: RscAction,
    },
    /// Print this help.
    Help,
    /// Quit.
    Exit,
}

#[derive(Debug, Subcommand)]
enum RscAction {
    /// Forget every resource folder.
    Clear,
    /// Add a resource folder.
    Add { dir: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LoadStage {
    Deep,
    Shallow,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ListPart {
    Obj,
    Mgr,
    Search,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Part {
    Obj,
    Mgr,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SearchMode {
    Plain,
    Re,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StyleLevel {
    Full,
    Simple,
}

/// Interactive session state.
pub struct Shell<W: Write> {
    ctx: Context,
    reader: Option<FileReader>,
    /// Object indices found by the last `search`.
    search: Option<Vec<usize>>,
    style: ListStyle,
    messages: Rc<RefCell<Vec<String>>>,
    out: W,
}

impl<W: Write> Shell<W> {
    /// Create a shell writing to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error when `options` names an unknown encoding or a
    /// missing folder.
    pub fn new(options: &ContextOptions, style: ListStyle, out: W) -> cmo_format::Result<Self> {
        let messages = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&messages);
        let ctx = Context::with_options(options)?.with_output(move |message: &str| {
            sink.borrow_mut().push(message.to_string());
        });
        Ok(Self {
            ctx,
            reader: None,
            search: None,
            style,
            messages,
            out,
        })
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    #[must_use]
    pub fn reader(&self) -> Option<&FileReader> {
        self.reader.as_ref()
    }

    #[must_use]
    pub fn style(&self) -> ListStyle {
        self.style
    }

    pub fn output_mut(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Load `path` as the `load` command would.
    ///
    /// # Errors
    ///
    /// Only failures of the output writer are returned.
    pub fn load_path(&mut self, path: &Path, deep: bool) -> io::Result<()> {
        let stage = if deep {
            LoadStage::Deep
        } else {
            LoadStage::Shallow
        };
        self.load(stage, path)
    }

    /// Run one command line.
    ///
    /// # Errors
    ///
    /// Only failures of the output writer are returned.
    pub fn execute_line(&mut self, line: &str) -> io::Result<Flow> {
        let Some(words) = split_command_line(line) else {
            writeln!(self.out, "Lexer error \"{line}\".\nType 'help' for usage.")?;
            return Ok(Flow::Continue);
        };
        if words.is_empty() {
            return Ok(Flow::Continue);
        }
        let command = match ShellLine::try_parse_from(&words) {
            Ok(parsed) => parsed.command,
            Err(err) if err.kind() == ErrorKind::DisplayHelp => {
                write!(self.out, "{err}")?;
                return Ok(Flow::Continue);
            }
            Err(err) => {
                debug!(kind = ?err.kind(), "command rejected");
                writeln!(self.out, "Parser error \"{line}\".\nType 'help' for usage.")?;
                return Ok(Flow::Continue);
            }
        };

        let flow = self.dispatch(command)?;
        self.flush_messages()?;
        Ok(flow)
    }

    fn dispatch(&mut self, command: ShellCommand) -> io::Result<Flow> {
        match command {
            ShellCommand::Load { stage, path } => self.load(stage, &path)?,
            ShellCommand::Unload => self.unload()?,
            ShellCommand::Save { path } => self.save(&path)?,
            ShellCommand::Info => self.info()?,
            ShellCommand::Ls { part, page } => self.list(part, page.get() - 1)?,
            ShellCommand::Data { part, index } => self.data(part, index)?,
            ShellCommand::Chunk { part, index } => self.chunk(part, index)?,
            ShellCommand::Search { part, mode, text } => self.search(part, mode, &text)?,
            ShellCommand::Items { count } => self.style.page_len = count.get(),
            ShellCommand::Style { level } => {
                self.style.full = matches!(level, StyleLevel::Full);
            }
            ShellCommand::Encoding { names } => self.set_encoding(&names)?,
            ShellCommand::Temp { path } => {
                if self.ctx.path_manager_mut().set_temp_folder(&path).is_err() {
                    writeln!(self.out, "Set temp folder failed. Check your path first.")?;
                }
            }
            ShellCommand::Rsc { action } => match action {
                RscAction::Clear => self.ctx.path_manager_mut().clear_paths(),
                RscAction::Add { dir } => {
                    if self.ctx.path_manager_mut().add_path(&dir).is_err() {
                        writeln!(
                            self.out,
                            "Set data resource folder failed. Check your path first."
                        )?;
                    }
                }
            },
            ShellCommand::Help => {
                let help = ShellLine::command().render_help();
                write!(self.out, "{help}")?;
            }
            ShellCommand::Exit => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }

    fn load(&mut self, stage: LoadStage, path: &Path) -> io::Result<()> {
        if self.reader.is_some() {
            writeln!(
                self.out,
                "Already have a opened file. Close it before calling 'load'."
            )?;
            return Ok(());
        }
        if self.ctx.encodings().is_empty() {
            writeln!(
                self.out,
                "You have not set encoding properly. Set it before loading by calling 'encoding'."
            )?;
            return Ok(());
        }

        let mut reader = FileReader::new();
        let result = match stage {
            LoadStage::Deep => reader.deep_load(&mut self.ctx, path),
            LoadStage::Shallow => reader.shallow_load(&mut self.ctx, path),
        };
        self.flush_messages()?;
        match result {
            Ok(()) => {
                self.reader = Some(reader);
                self.search = None;
            }
            Err(err) => {
                self.report_failure("Fail to load file.", &err)?;
                self.clear_document();
            }
        }
        Ok(())
    }

    fn unload(&mut self) -> io::Result<()> {
        if self.reader.is_none() {
            writeln!(self.out, "No loaded file.")?;
        } else {
            self.clear_document();
        }
        Ok(())
    }

    fn save(&mut self, path: &Path) -> io::Result<()> {
        let Some(reader) = self.reader.as_ref() else {
            writeln!(self.out, "No loaded file.")?;
            return Ok(());
        };
        if self.ctx.encodings().is_empty() {
            writeln!(
                self.out,
                "You have not set encoding properly. Set it before saving by calling 'encoding'."
            )?;
            return Ok(());
        }

        let mut writer = FileWriter::from_reader(reader, &self.ctx);
        let file_mode = reader.file_info().write_mode;
        let previous_mode = self.ctx.write_mode();
        self.ctx.set_write_mode(file_mode);
        let result = writer.save(&mut self.ctx, path);
        self.ctx.set_write_mode(previous_mode);
        self.flush_messages()?;
        if let Err(err) = result {
            self.report_failure("Fail to save file.", &err)?;
        }
        Ok(())
    }

    fn info(&mut self) -> io::Result<()> {
        match &self.reader {
            Some(reader) => write!(self.out, "{}", format::file_info(reader.file_info())),
            None => writeln!(self.out, "No loaded file."),
        }
    }

    fn list(&mut self, part: ListPart, page: usize) -> io::Result<()> {
        let Some(reader) = &self.reader else {
            return writeln!(self.out, "No loaded file.");
        };
        let text = match part {
            ListPart::Obj => {
                let indices: Vec<usize> = (0..reader.objects().len()).collect();
                format::object_list(
                    "CKFileObject",
                    reader.objects(),
                    &indices,
                    reader.file_info(),
                    page,
                    self.style,
                )
            }
            ListPart::Mgr => format::manager_list(reader.managers(), page, self.style),
            ListPart::Search => match &self.search {
                Some(indices) => format::object_list(
                    "CKFileObject Searching Result",
                    reader.objects(),
                    indices,
                    reader.file_info(),
                    page,
                    self.style,
                ),
                None => String::from("No search result to list.\n"),
            },
        };
        write!(self.out, "{text}")
    }

    fn data(&mut self, part: Part, index: usize) -> io::Result<()> {
        let Some(reader) = &self.reader else {
            return writeln!(self.out, "No loaded file.");
        };
        match part {
            Part::Obj => match reader.objects().get(index) {
                Some(obj) => {
                    let text =
                        format::live_object(&self.ctx, self.ctx.object(obj.created_id), self.style);
                    write!(self.out, "{text}")
                }
                None => writeln!(self.out, "Index out of range."),
            },
            Part::Mgr => writeln!(self.out, "Not supported now."),
        }
    }

    fn chunk(&mut self, part: Part, index: usize) -> io::Result<()> {
        let Some(reader) = &self.reader else {
            return writeln!(self.out, "No loaded file.");
        };
        let chunk = match part {
            Part::Obj => reader.objects().get(index).map(|obj| obj.chunk.as_ref()),
            Part::Mgr => reader.managers().get(index).map(|mgr| mgr.chunk.as_ref()),
        };
        match chunk {
            Some(chunk) => write!(self.out, "{}", format::state_chunk(chunk, self.style)),
            None => writeln!(self.out, "Index out of range."),
        }
    }

    fn search(&mut self, part: Part, mode: SearchMode, text: &str) -> io::Result<()> {
        let Some(reader) = &self.reader else {
            return writeln!(self.out, "No loaded file.");
        };
        if matches!(part, Part::Mgr) {
            return writeln!(self.out, "Not supported now.");
        }

        let found = match mode {
            SearchMode::Plain => reader.document().find_objects(|name| name.contains(text)),
            SearchMode::Re => match Regex::new(text) {
                Ok(re) => reader.document().find_objects(|name| re.is_match(name)),
                Err(err) => return writeln!(self.out, "Invalid regular expressions: {err}"),
            },
        };
        if found.is_empty() {
            writeln!(self.out, "Search done, but no result.")?;
        } else {
            writeln!(
                self.out,
                "Search done with {} results. Use `ls search` to check them.",
                found.len()
            )?;
        }
        self.search = Some(found);
        Ok(())
    }

    fn set_encoding(&mut self, names: &[String]) -> io::Result<()> {
        match EncodingList::from_labels(names) {
            Ok(encodings) => {
                self.ctx.set_encodings(encodings);
                Ok(())
            }
            Err(err) => writeln!(self.out, "Set encoding failed: {err}"),
        }
    }

    fn report_failure(&mut self, what: &str, err: &CmoError) -> io::Result<()> {
        writeln!(
            self.out,
            "{what} Function return: {}\n\t{}",
            err.error_name(),
            format::error_description(err)
        )
    }

    fn clear_document(&mut self) {
        self.search = None;
        self.reader = None;
        self.ctx.clear_all();
    }

    fn flush_messages(&mut self) -> io::Result<()> {
        let pending: Vec<String> = self.messages.borrow_mut().drain(..).collect();
        for message in pending {
            writeln!(self.out, "[CKContext] {message}")?;
        }
        Ok(())
    }
}
