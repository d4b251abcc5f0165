// Instrumentation Injector - python source that captures every rendered figure
//
// The fragment replaces `matplotlib.pyplot.show`. Each call saves every open
// figure that has not been saved yet, then closes it and delegates to the
// original `show`. Counter and saved-set live in a closure owned by one
// installation, so separate runs never share state.

use super::constants::{
    FIGURE_DPI, FIGURE_FORMAT, PLOT_BACKEND, SEQUENTIAL_PREFIX, SEQUENTIAL_WIDTH,
};
use std::path::{Path, PathBuf};

/// How captured figures are named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FigureNaming {
    /// Sanitised axis title, else suptitle, else `figure_NNN`
    TitleDerived,
    /// Always `figure_NNN`
    Sequential,
}

/// Builder for the capture fragment
#[derive(Debug, Clone)]
pub struct CaptureFragment {
    output_dir: PathBuf,
    naming: FigureNaming,
    work_dir: Option<PathBuf>,
    manifest: Option<PathBuf>,
}

impl CaptureFragment {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            naming: FigureNaming::TitleDerived,
            work_dir: None,
            manifest: None,
        }
    }

    pub fn naming(mut self, naming: FigureNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Change into `dir` before anything else runs
    pub fn in_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Append one JSON line per capture attempt to `path`
    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some(path.into());
        self
    }

    pub fn render(&self) -> String {
        let mut src = String::new();
        src.push_str("import os as _os, json as _json, re as _re, weakref as _weakref\n");
        if let Some(dir) = &self.work_dir {
            src.push_str(&format!("_os.chdir({})\n", py_path(dir)));
        }
        src.push_str("import matplotlib as _mpl\n");
        src.push_str(&format!("_mpl.use({})\n", py_str(PLOT_BACKEND)));
        src.push_str("import matplotlib.pyplot as plt\n");
        src.push_str(INSTALL_FN);
        src.push_str(&format!(
            "_harvest_install({out}, {manifest}, {titles}, {fmt}, {dpi}, {pattern})\n",
            out = py_path(&self.output_dir),
            manifest = self
                .manifest
                .as_deref()
                .map(py_path)
                .unwrap_or_else(|| "None".to_string()),
            titles = match self.naming {
                FigureNaming::TitleDerived => "True",
                FigureNaming::Sequential => "False",
            },
            fmt = py_str(FIGURE_FORMAT),
            dpi = FIGURE_DPI,
            pattern = py_str(&format!("{SEQUENTIAL_PREFIX}_%0{SEQUENTIAL_WIDTH}d")),
        ));
        src.push_str("del _harvest_install\n");
        src
    }
}

/// Driver program for script units: capture hook, then the script as `__main__`
#[derive(Debug, Clone)]
pub struct ScriptDriver {
    capture: CaptureFragment,
    script: PathBuf,
}

impl ScriptDriver {
    /// Scripts always use sequential naming
    pub fn new(script: impl Into<PathBuf>, capture: CaptureFragment) -> Self {
        Self {
            capture: capture.naming(FigureNaming::Sequential),
            script: script.into(),
        }
    }

    pub fn render(&self) -> String {
        let mut src = self.capture.render();
        src.push_str("import sys as _sys, runpy as _runpy\n");
        src.push_str(&format!("_sys.argv = [{}]\n", py_path(&self.script)));
        src.push_str(&format!(
            "_runpy.run_path({}, run_name=\"__main__\")\n",
            py_path(&self.script)
        ));
        src
    }
}

const INSTALL_FN: &str = r#"
def _harvest_install(output_dir, manifest, title_naming, fmt, dpi, seq_pattern):
    _os.makedirs(output_dir, exist_ok=True)
    state = {"count": 0}
    saved = _weakref.WeakSet()
    original_show = plt.show

    def record(event):
        if manifest is None:
            return
        try:
            with open(manifest, "a", encoding="utf-8") as fh:
                fh.write(_json.dumps(event) + "\n")
        except Exception:
            pass

    def title_of(fig):
        for ax in fig.axes:
            text = ax.get_title()
            if text:
                return text
        sup = getattr(fig, "_suptitle", None)
        if sup is not None and sup.get_text():
            return sup.get_text()
        return ""

    def slug(text):
        text = _re.sub(r"[^\w\s-]", "", text)
        text = _re.sub(r"[-\s]+", "_", text)
        return text.strip("_").lower()

    def free_path(base):
        path = _os.path.join(output_dir, "%s.%s" % (base, fmt))
        n = 1
        while _os.path.exists(path):
            path = _os.path.join(output_dir, "%s_%d.%s" % (base, n, fmt))
            n += 1
        return path

    def capture():
        for num in list(plt.get_fignums()):
            fig = plt.figure(num)
            if fig in saved:
                continue
            state["count"] += 1
            n = state["count"]
            base = slug(title_of(fig)) if title_naming else ""
            if not base:
                base = seq_pattern % n
            path = free_path(base)
            try:
                if title_naming:
                    fig.savefig(path, format=fmt, dpi=dpi, bbox_inches="tight")
                else:
                    fig.savefig(path, format=fmt, dpi=dpi)
                saved.add(fig)
                record({"event": "saved", "figure": n, "path": path})
            except Exception as exc:
                record({"event": "save_failed", "figure": n, "path": path, "error": repr(exc)})
            try:
                plt.close(fig)
            except Exception:
                pass

    def show(*args, **kwargs):
        capture()
        return original_show(*args, **kwargs)

    show.harvest_capture = capture
    plt.show = show

"#;

/// Python string literal for `s` (JSON string syntax is valid python)
fn py_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn py_path(path: &Path) -> String {
    py_str(&path.to_string_lossy())
}
