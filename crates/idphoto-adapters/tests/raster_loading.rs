//! Integration tests for raster image discovery and loading.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_truncation)]

use std::path::{Path, PathBuf};

use idphoto_adapters::{FsImageLoader, FsImageSource};
use idphoto_core::domain::ImageInput;
use idphoto_core::ports::{ImageLoader, ImageSource};
use image::{ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

fn write_image(dir: &Path, name: &str, format: ImageFormat) -> PathBuf {
    let path = dir.join(name);
    let img = RgbImage::from_fn(12, 8, |x, y| Rgb([(x * 20) as u8, (y * 30) as u8, 90]));
    img.save_with_format(&path, format).expect("should write fixture");
    path
}

fn paths(source: &FsImageSource) -> Vec<PathBuf> {
    source
        .inputs()
        .map(|input| match input {
            ImageInput::Path(path) => path,
            ImageInput::Decoded(info) => panic!("unexpected decoded input {}", info.path),
        })
        .collect()
}

#[test]
fn test_load_png() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "portrait.png", ImageFormat::Png);

    let info = FsImageLoader.load(&path).expect("should load PNG");
    assert_eq!(info.width, 12);
    assert_eq!(info.height, 8);
    assert!(info.path.ends_with("portrait.png"));
    assert_eq!(info.to_rgb8().get_pixel(3, 2).0, [60, 60, 90]);
}

#[test]
fn test_load_jpeg() {
    let dir = TempDir::new().unwrap();
    let path = write_image(dir.path(), "portrait.jpg", ImageFormat::Jpeg);

    let info = FsImageLoader.load(&path).expect("should load JPEG");
    assert_eq!((info.width, info.height), (12, 8));
}

#[test]
fn test_load_bmp_and_tiff() {
    let dir = TempDir::new().unwrap();
    for (name, format) in [("a.bmp", ImageFormat::Bmp), ("b.tiff", ImageFormat::Tiff)] {
        let path = write_image(dir.path(), name, format);
        let info = FsImageLoader.load(&path).unwrap();
        assert_eq!((info.width, info.height), (12, 8), "{name}");
    }
}

#[test]
fn test_format_is_sniffed_from_content() {
    let dir = TempDir::new().unwrap();
    // PNG bytes behind a .jpg extension
    let path = write_image(dir.path(), "mislabelled.jpg", ImageFormat::Png);
    let info = FsImageLoader.load(&path).unwrap();
    assert_eq!(info.width, 12);
}

#[test]
fn test_missing_file_is_not_found() {
    let err = FsImageLoader
        .load(Path::new("/nonexistent/portrait.png"))
        .unwrap_err();
    let io = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<std::io::Error>())
        .expect("should carry the io error");
    assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn test_corrupt_file_fails_to_decode() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"\x89PNG\r\n\x1a\nthis is not a png").unwrap();
    assert!(FsImageLoader.load(&path).is_err());
}

#[test]
fn test_directory_scan_is_sorted_and_filtered() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "c.png", ImageFormat::Png);
    write_image(dir.path(), "a.jpg", ImageFormat::Jpeg);
    write_image(dir.path(), "b.bmp", ImageFormat::Bmp);
    std::fs::write(dir.path().join("a.faces.json"), "{}").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

    let source = FsImageSource::new(vec![dir.path().to_path_buf()], false);
    let names: Vec<String> = paths(&source)
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["a.jpg", "b.bmp", "c.png"]);
    assert_eq!(source.count_hint(), Some(3));
}

#[test]
fn test_recursion_is_opt_in() {
    let dir = TempDir::new().unwrap();
    write_image(dir.path(), "top.png", ImageFormat::Png);
    let nested = dir.path().join("nested");
    std::fs::create_dir(&nested).unwrap();
    write_image(&nested, "inner.png", ImageFormat::Png);

    let flat = FsImageSource::new(vec![dir.path().to_path_buf()], false);
    assert_eq!(flat.count_hint(), Some(1));

    let deep = FsImageSource::new(vec![dir.path().to_path_buf()], true);
    let found = paths(&deep);
    assert_eq!(found.len(), 2);
    assert!(found.iter().any(|p| p.ends_with("nested/inner.png")));
}

#[test]
fn test_explicit_files_keep_argument_order() {
    let dir = TempDir::new().unwrap();
    let second = write_image(dir.path(), "z.png", ImageFormat::Png);
    let first = write_image(dir.path(), "a.png", ImageFormat::Png);
    let unsupported = dir.path().join("readme.md");
    std::fs::write(&unsupported, "#").unwrap();

    let source = FsImageSource::new(vec![second.clone(), unsupported, first.clone()], false);
    assert_eq!(paths(&source), [second, first]);
}
