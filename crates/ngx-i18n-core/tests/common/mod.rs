#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ngx_i18n_core::i18n::{Key, KeyLocaleValueMap, Locale};
use ngx_i18n_core::{CaptureBuffer, Console, ExitOutcome, HostShell, SheetLayout, Workbook};
use ngx_i18n_sandbox::{AccessMode, CapabilityContext, DEFAULT_ROOT};
use tokio_util::sync::CancellationToken;

pub const ANGULAR_JSON: &str = r#"{
  "version": 1,
  "projects": {
    "design-system": { "projectType": "library" },
    "shop": {
      "projectType": "application",
      "i18n": {
        "sourceLocale": "en",
        "locales": {
          "fr": "src/locale/messages.fr.xlf",
          "de": { "translation": "src/locale/messages.de.xlf", "baseHref": "/de/" }
        }
      }
    }
  }
}"#;

pub const SOURCE_XLF: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<xliff version="1.2" xmlns="urn:oasis:names:tc:xliff:document:1.2">
  <file source-language="en" datatype="plaintext" original="ng2.template">
    <body>
      <trans-unit id="cart.count" datatype="html">
        <source>You have <x id="INTERPOLATION" equiv-text="{{ count }}"/> items</source>
        <context-group purpose="location">
          <context context-type="sourcefile">src/app/cart.component.html</context>
          <context context-type="linenumber">12</context>
        </context-group>
      </trans-unit>
      <trans-unit id="cart.empty" datatype="html">
        <source>Your cart is
          empty</source>
      </trans-unit>
      <trans-unit id="footer.terms" datatype="html">
        <source>Terms &amp; conditions</source>
        <note priority="1" from="description">Footer link</note>
      </trans-unit>
    </body>
  </file>
</xliff>
"#;

pub struct Fixture {
    pub dir: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Self { dir };
        fixture.write("angular.json", ANGULAR_JSON);
        fixture.write("src/locale/messages.xlf", SOURCE_XLF);
        fixture
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn read_bytes(&self, relative: &str) -> Vec<u8> {
        fs::read(self.path(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    /// Write `translations.xlsx` with the given columns and rows.
    pub fn write_workbook(&self, locales: &[&str], rows: &[(&str, &[(&str, &str)])]) {
        let table: KeyLocaleValueMap = rows
            .iter()
            .map(|(key, values)| {
                (
                    Key::from(*key),
                    values
                        .iter()
                        .map(|(l, v)| (Locale::from(*l), v.to_string()))
                        .collect(),
                )
            })
            .collect();
        let workbook = Workbook::new(locales.iter().map(|l| Locale::from(*l)).collect(), table);
        fs::write(
            self.path("translations.xlsx"),
            workbook.to_bytes(&SheetLayout::default()).unwrap(),
        )
        .unwrap();
    }

    pub fn read_workbook(&self, relative: &str) -> Workbook {
        Workbook::from_bytes(&self.read_bytes(relative)).unwrap()
    }

    pub fn context(&self, args: &[&str]) -> CapabilityContext {
        self.context_with(args, &[], AccessMode::ReadWrite)
    }

    pub fn context_with(
        &self,
        args: &[&str],
        env: &[(&str, &str)],
        mode: AccessMode,
    ) -> CapabilityContext {
        CapabilityContext::builder()
            .arg("ngx-xlf-xlsx")
            .args(args.iter().copied())
            .envs(env.iter().map(|(k, v)| (k.to_string(), v.to_string())))
            .root(DEFAULT_ROOT, self.dir.path(), mode)
            .build()
            .unwrap()
    }

    /// Leftover temp files anywhere under the project.
    pub fn temp_files(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_temp_files(self.dir.path(), &mut found);
        found
    }

    /// Every file under the project with its bytes.
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        collect_files(self.dir.path(), self.dir.path(), &mut files);
        files
    }
}

fn collect_temp_files(dir: &Path, found: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_temp_files(&path, found);
        } else if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(".tmp"))
        {
            found.push(path);
        }
    }
}

fn collect_files(base: &Path, dir: &Path, files: &mut BTreeMap<PathBuf, Vec<u8>>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_files(base, &path, files);
        } else {
            let relative = path.strip_prefix(base).unwrap().to_path_buf();
            files.insert(relative, fs::read(&path).unwrap());
        }
    }
}

pub struct Captured {
    pub outcome: ExitOutcome,
    pub stdout: String,
    pub stderr: String,
}

pub async fn run_shell(ctx: CapabilityContext) -> Captured {
    run_shell_with(ctx, CancellationToken::new()).await
}

pub async fn run_shell_with(ctx: CapabilityContext, cancel: CancellationToken) -> Captured {
    let (console, out, err) = Console::capture();
    let outcome = HostShell::new(ctx, console).run(cancel).await;
    Captured {
        outcome,
        stdout: out.contents(),
        stderr: err.contents(),
    }
}

/// Stderr sink that cancels `token` once a line containing `trigger` is written.
pub struct CancelOnLine {
    pub buffer: CaptureBuffer,
    trigger: &'static str,
    token: CancellationToken,
    seen: String,
}

impl CancelOnLine {
    pub fn new(trigger: &'static str, token: CancellationToken) -> Self {
        Self {
            buffer: CaptureBuffer::default(),
            trigger,
            token,
            seen: String::new(),
        }
    }
}

impl Write for CancelOnLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write_all(buf)?;
        self.seen.push_str(&String::from_utf8_lossy(buf));
        if self.seen.contains(self.trigger) {
            self.token.cancel();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run with stderr wired to cancel the run when `trigger` shows up.
pub async fn run_cancelling_on(ctx: CapabilityContext, trigger: &'static str) -> Captured {
    let cancel = CancellationToken::new();
    let sink = CancelOnLine::new(trigger, cancel.clone());
    let stderr = sink.buffer.clone();
    let stdout = CaptureBuffer::default();
    let console = Console::new(stdout.clone(), sink);
    let outcome = HostShell::new(ctx, console).run(cancel).await;
    Captured {
        outcome,
        stdout: stdout.contents(),
        stderr: stderr.contents(),
    }
}
