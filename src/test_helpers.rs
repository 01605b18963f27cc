//! Shared test utilities for the simple-pano test suite.
//!
//! Provides fixture builders (panorama roots, placeholder images, descriptor
//! files), canned scene documents as the tiling tool would write them, and
//! small extractors for asserting on parsed XML.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let descriptor = descriptor_fixture(&tmp, "harbour");
//! assert!(descriptor.input.is_file());
//! ```

use crate::descriptor::{SceneDescriptor, ViewOverrides};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use xmltree::Element;

// =========================================================================
// Canned scene documents
// =========================================================================

/// A scene document the way `makepano` writes one, with a `<view>`.
pub const SCENE_WITH_VIEW: &str = r#"<krpano version="1.19" title="harbour">
  <view hlookat="0" vlookat="0" fovtype="MFOV" fov="90" maxpixelzoom="2.0" fovmin="70" fovmax="140" limitview="auto" />
  <preview url="harbour.tiles/preview.jpg" />
  <image type="CYLINDER" hfov="360" vfov="60" voffset="0" multires="true" tilesize="512">
    <level tiledimagewidth="8192" tiledimageheight="1366">
      <cylinder url="harbour.tiles/l1/%v/l1_%v_%h.jpg" />
    </level>
  </image>
</krpano>
"#;

/// A scene document without a `<view>` element.
pub const SCENE_WITHOUT_VIEW: &str = r#"<krpano version="1.19" title="harbour">
  <preview url="harbour.tiles/preview.jpg" />
  <image type="CYLINDER" hfov="360" multires="true" tilesize="512">
    <level tiledimagewidth="8192" tiledimageheight="1366">
      <cylinder url="harbour.tiles/l1/%v/l1_%v_%h.jpg" />
    </level>
  </image>
</krpano>
"#;

// =========================================================================
// Fixture setup
// =========================================================================

/// Create (if needed) and return the panorama root inside `tmp`.
pub fn panorama_root(tmp: &TempDir) -> PathBuf {
    let root = tmp.path().join("panoramas");
    fs::create_dir_all(&root).unwrap();
    root
}

/// Write a placeholder image, creating parent directories.
pub fn write_image(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"\xff\xd8\xff\xe0 not really a jpeg").unwrap();
}

/// Write `<dir>/<name>.yaml` and return its path.
pub fn write_descriptor(dir: &Path, name: &str, yaml: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{name}.yaml"));
    fs::write(&path, yaml).unwrap();
    path
}

/// A minimal valid descriptor whose input image exists under the
/// panorama root: cylinder, 360° wide, no overrides, no hotspots.
pub fn descriptor_fixture(tmp: &TempDir, pname: &str) -> SceneDescriptor {
    let input = panorama_root(tmp).join(format!("{pname}.tif"));
    write_image(&input);
    SceneDescriptor {
        pname: pname.to_string(),
        input,
        panotype: "cylinder".into(),
        hfov: "360".into(),
        vfov: None,
        voffset: None,
        view: ViewOverrides::default(),
        preview: None,
        twittercard: None,
        title: None,
        description: None,
        hotspots: Vec::new(),
        origin: None,
    }
}

/// Push a file's modification time a minute into the future.
pub fn touch_future(path: &Path) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();
}

// =========================================================================
// XML extractors
// =========================================================================

/// `url` attributes of the root's direct `<include>` children, in order.
pub fn child_includes(root: &Element) -> Vec<String> {
    root.children
        .iter()
        .filter_map(|n| n.as_element())
        .filter(|e| e.name == "include")
        .filter_map(|e| e.attributes.get("url").cloned())
        .collect()
}
