//! Scene documents and their post-processing.
//!
//! The tiling tool writes `<pname>.xml`; [`SceneDocument`] holds it as a
//! mutable element tree. Right after a fresh generation, [`finish`] applies
//! the descriptor-driven changes in a fixed order and persists the result:
//!
//! 1. **View overrides**: `hlookat`, `vlookat`, `fov` on the root `<view>`,
//!    when the descriptor supplies them. A document without `<view>` is left
//!    alone.
//! 2. **Hotspots**: write `<pname>_hotspots.xml` and `<include>` it.
//! 3. **Debug extensions** (opt-in): a view-change trace `<events>`, the
//!    helper tool include, the staged plugin fragments, the toolbox include.
//! 4. **Persist** over the original path.
//!
//! Appending is not idempotent, so a document must be mutated exactly once.
//! [`SceneDocument::save`] consumes the document, and only freshly generated
//! documents reach [`finish`].

use crate::assets::{self, AssetError, DEBUG_PLUGINS, HELPER_TOOL, PLUGINS_DIR};
use crate::context::{BuildContext, BuildEvent};
use crate::descriptor::SceneDescriptor;
use crate::hotspots::{self, HotspotError};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use xmltree::{Element, EmitterConfig, XMLNode};

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed scene document {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: xmltree::ParseError,
    },
    #[error("cannot write scene document {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: xmltree::Error,
    },
    #[error(transparent)]
    Hotspots(#[from] HotspotError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Fixed trace expression bound to view changes in debug builds.
pub const DEBUG_VIEW_TRACE: &str = "showlog(true);trace('hlookat ',view.hlookat);trace('vlookat ',view.vlookat);trace('fov ',view.fov);";
/// Include target of the debug toolbox.
pub const TOOLBOX_INCLUDE: &str = "plugins/toolbox.xml";

/// A parsed scene document bound to the path it was read from.
#[derive(Debug, Clone)]
pub struct SceneDocument {
    path: PathBuf,
    root: Element,
}

/// Result of looking up the `<view>` element for overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOverride {
    /// No `<view>` in the document; nothing was changed.
    Absent,
    /// `<view>` found; this many attributes were set.
    Applied(usize),
}

impl SceneDocument {
    pub fn load(path: &Path) -> Result<Self, SceneError> {
        let file = File::open(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let root = Element::parse(BufReader::new(file)).map_err(|source| SceneError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn view(&self) -> Option<&Element> {
        self.root.get_child("view")
    }

    pub fn view_mut(&mut self) -> Option<&mut Element> {
        self.root.get_mut_child("view")
    }

    /// Append an element as the last child of the root.
    pub fn append(&mut self, element: Element) {
        self.root.children.push(XMLNode::Element(element));
    }

    /// Write the document back over its original path.
    pub fn save(self) -> Result<PathBuf, SceneError> {
        let file = File::create(&self.path).map_err(|source| SceneError::Io {
            path: self.path.clone(),
            source,
        })?;
        self.root
            .write_with_config(
                BufWriter::new(file),
                EmitterConfig::new().perform_indent(true),
            )
            .map_err(|source| SceneError::Write {
                path: self.path.clone(),
                source,
            })?;
        Ok(self.path)
    }
}

fn element(name: &str, attributes: &[(&str, &str)]) -> Element {
    let mut e = Element::new(name);
    for (k, v) in attributes {
        e.attributes.insert(k.to_string(), v.to_string());
    }
    e
}

fn include(url: &str) -> Element {
    element("include", &[("url", url)])
}

/// Set every supplied view override on the root `<view>` element.
pub fn apply_view_overrides(
    doc: &mut SceneDocument,
    descriptor: &SceneDescriptor,
    ctx: &BuildContext,
) -> ViewOverride {
    let Some(view) = doc.view_mut() else {
        ctx.emit(BuildEvent::ViewMissing {
            pname: descriptor.pname.clone(),
        });
        return ViewOverride::Absent;
    };

    let mut applied = 0;
    for (attribute, value) in descriptor.view.entries() {
        if let Some(value) = value {
            view.attributes
                .insert(attribute.to_string(), value.to_string());
            ctx.emit(BuildEvent::ViewOverridden {
                pname: descriptor.pname.clone(),
                attribute,
                value: value.to_string(),
            });
            applied += 1;
        }
    }
    ViewOverride::Applied(applied)
}

/// Append the debug `<events>` and includes, staging the helper fragment
/// next to the scene document and the plugin fragments under `plugins/`.
pub fn apply_debug_extensions(
    doc: &mut SceneDocument,
    outdir: &Path,
    ctx: &BuildContext,
) -> Result<(), SceneError> {
    doc.append(element("events", &[("onviewchange", DEBUG_VIEW_TRACE)]));

    doc.append(include(HELPER_TOOL));
    assets::ensure(HELPER_TOOL, outdir, ctx)?;

    let plugins = outdir.join(PLUGINS_DIR);
    for name in DEBUG_PLUGINS {
        assets::ensure(name, &plugins, ctx)?;
    }
    doc.append(include(TOOLBOX_INCLUDE));
    Ok(())
}

/// Apply steps 1-3 to a freshly generated document.
pub fn mutate(
    doc: &mut SceneDocument,
    descriptor: &SceneDescriptor,
    outdir: &Path,
    debug: bool,
    ctx: &BuildContext,
) -> Result<(), SceneError> {
    apply_view_overrides(doc, descriptor, ctx);

    if !descriptor.hotspots.is_empty() {
        hotspots::write(descriptor, outdir, ctx)?;
        doc.append(include(&hotspots::fragment_name(&descriptor.pname)));
    }

    if debug {
        apply_debug_extensions(doc, outdir, ctx)?;
    }
    Ok(())
}

/// Mutate a freshly generated document and persist it. Consumes the
/// document so it cannot be mutated twice.
pub fn finish(
    mut doc: SceneDocument,
    descriptor: &SceneDescriptor,
    outdir: &Path,
    debug: bool,
    ctx: &BuildContext,
) -> Result<PathBuf, SceneError> {
    mutate(&mut doc, descriptor, outdir, debug, ctx)?;
    let path = doc.save()?;
    ctx.emit(BuildEvent::SceneWritten {
        pname: descriptor.pname.clone(),
        path: path.clone(),
    });
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Hotspot;
    use crate::test_helpers::*;
    use std::fs;
    use tempfile::TempDir;

    fn scene_at(dir: &Path, xml: &str) -> SceneDocument {
        let path = dir.join("harbour.xml");
        fs::write(&path, xml).unwrap();
        SceneDocument::load(&path).unwrap()
    }

    #[test]
    fn view_override_sets_supplied_attribute_only() {
        let tmp = TempDir::new().unwrap();
        let mut doc = scene_at(tmp.path(), SCENE_WITH_VIEW);
        let mut d = descriptor_fixture(&tmp, "harbour");
        d.view.hlookat = Some("30".into());

        let result = apply_view_overrides(&mut doc, &d, &BuildContext::new());

        assert_eq!(result, ViewOverride::Applied(1));
        let view = doc.view().unwrap();
        assert_eq!(view.attributes.get("hlookat").map(String::as_str), Some("30"));
        assert_eq!(view.attributes.get("vlookat").map(String::as_str), Some("0"));
        assert_eq!(view.attributes.get("fov").map(String::as_str), Some("90"));
    }

    #[test]
    fn no_overrides_leave_view_untouched() {
        let tmp = TempDir::new().unwrap();
        let mut doc = scene_at(tmp.path(), SCENE_WITH_VIEW);
        let before = doc.view().unwrap().clone();
        let d = descriptor_fixture(&tmp, "harbour");

        assert_eq!(
            apply_view_overrides(&mut doc, &d, &BuildContext::new()),
            ViewOverride::Applied(0)
        );
        assert_eq!(doc.view().unwrap(), &before);
    }

    #[test]
    fn missing_view_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut doc = scene_at(tmp.path(), SCENE_WITHOUT_VIEW);
        let mut d = descriptor_fixture(&tmp, "harbour");
        d.view.fov = Some("70".into());

        let (tx, rx) = std::sync::mpsc::channel();
        let ctx = BuildContext::new().with_events(tx);
        assert_eq!(apply_view_overrides(&mut doc, &d, &ctx), ViewOverride::Absent);
        assert!(doc.view().is_none());
        drop(ctx);
        assert_eq!(
            rx.iter().collect::<Vec<_>>(),
            vec![BuildEvent::ViewMissing {
                pname: "harbour".into()
            }]
        );
    }

    #[test]
    fn hotspots_append_include_and_write_fragment() {
        let tmp = TempDir::new().unwrap();
        let outdir = tmp.path().to_path_buf();
        let mut doc = scene_at(&outdir, SCENE_WITH_VIEW);
        let mut d = descriptor_fixture(&tmp, "harbour");
        d.hotspots = vec![Hotspot {
            ath: "10".into(),
            atv: "-5".into(),
            description: "A".into(),
        }];

        mutate(&mut doc, &d, &outdir, false, &BuildContext::new()).unwrap();

        assert_eq!(
            child_includes(doc.root()),
            vec!["harbour_hotspots.xml".to_string()]
        );
        assert!(outdir.join("harbour_hotspots.xml").is_file());
    }

    #[test]
    fn no_hotspots_no_include() {
        let tmp = TempDir::new().unwrap();
        let outdir = tmp.path().to_path_buf();
        let mut doc = scene_at(&outdir, SCENE_WITH_VIEW);
        let d = descriptor_fixture(&tmp, "harbour");

        mutate(&mut doc, &d, &outdir, false, &BuildContext::new()).unwrap();

        assert!(child_includes(doc.root()).is_empty());
        assert!(!outdir.join("harbour_hotspots.xml").exists());
    }

    #[test]
    fn debug_extensions_in_fixed_order() {
        let tmp = TempDir::new().unwrap();
        let outdir = tmp.path().to_path_buf();
        let mut doc = scene_at(&outdir, SCENE_WITH_VIEW);
        let d = descriptor_fixture(&tmp, "harbour");

        mutate(&mut doc, &d, &outdir, true, &BuildContext::new()).unwrap();

        let appended: Vec<&str> = doc
            .root()
            .children
            .iter()
            .filter_map(|n| n.as_element())
            .skip_while(|e| e.name != "events")
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(appended, vec!["events", "include", "include"]);

        let events = doc.root().get_child("events").unwrap();
        assert_eq!(events.attributes["onviewchange"], DEBUG_VIEW_TRACE);
        assert_eq!(
            child_includes(doc.root()),
            vec![HELPER_TOOL.to_string(), TOOLBOX_INCLUDE.to_string()]
        );

        assert!(outdir.join(HELPER_TOOL).is_file());
        for name in DEBUG_PLUGINS {
            assert!(outdir.join("plugins").join(name).is_file(), "{name}");
        }
    }

    #[test]
    fn hotspot_include_precedes_debug_extensions() {
        let tmp = TempDir::new().unwrap();
        let outdir = tmp.path().to_path_buf();
        let mut doc = scene_at(&outdir, SCENE_WITH_VIEW);
        let mut d = descriptor_fixture(&tmp, "harbour");
        d.hotspots = vec![Hotspot {
            ath: "1".into(),
            atv: "2".into(),
            description: "x".into(),
        }];

        mutate(&mut doc, &d, &outdir, true, &BuildContext::new()).unwrap();
        assert_eq!(
            child_includes(doc.root()),
            vec![
                "harbour_hotspots.xml".to_string(),
                HELPER_TOOL.to_string(),
                TOOLBOX_INCLUDE.to_string()
            ]
        );
    }

    #[test]
    fn finish_persists_over_original_path() {
        let tmp = TempDir::new().unwrap();
        let outdir = tmp.path().to_path_buf();
        let doc = scene_at(&outdir, SCENE_WITH_VIEW);
        let mut d = descriptor_fixture(&tmp, "harbour");
        d.view.hlookat = Some("30".into());

        let path = finish(doc, &d, &outdir, false, &BuildContext::new()).unwrap();
        assert_eq!(path, outdir.join("harbour.xml"));

        let reloaded = SceneDocument::load(&path).unwrap();
        let view = reloaded.view().unwrap();
        assert_eq!(view.attributes["hlookat"], "30");
        // Untouched content survives the rewrite.
        assert!(reloaded.root().get_child("image").is_some());
    }

    #[test]
    fn load_rejects_malformed_xml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.xml");
        fs::write(&path, "<krpano><view").unwrap();
        assert!(matches!(
            SceneDocument::load(&path),
            Err(SceneError::Parse { .. })
        ));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            SceneDocument::load(&tmp.path().join("none.xml")),
            Err(SceneError::Io { .. })
        ));
    }
}
