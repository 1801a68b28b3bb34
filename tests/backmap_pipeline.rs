use std::path::Path;

use image::{ImageBuffer, Luma};

use cellmap::backmap::{backmap_u8, BackmapError, Condition};
use cellmap::color::Colormap;
use cellmap::data::loader::{load_table, LoaderOptions};
use cellmap::data::mask::LabelMask;
use cellmap::data::store::FeatureStore;
use cellmap::render;
use cellmap::state::ViewSession;

fn write_mask(path: &Path, width: u32, height: u32, labels: Vec<u16>) {
    let buf: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(width, height, labels).unwrap();
    buf.save(path).unwrap();
}

#[test]
fn test_table_and_mask_files_to_png() {
    let dir = tempfile::tempdir().unwrap();
    let table_path = dir.path().join("cells.csv");
    let mask_path = dir.path().join("mask.png");
    let out_path = dir.path().join("area.png");

    std::fs::write(
        &table_path,
        "ImageNumber,ObjectNumber,Area,Treatment\n\
         1,1,10,DMSO\n\
         1,2,20,DMSO\n\
         2,1,99,Taxol\n",
    )
    .unwrap();
    write_mask(&mask_path, 3, 2, vec![0, 1, 1, 2, 2, 0]);

    let table = load_table(&table_path, &LoaderOptions::default()).unwrap();
    let mask = LabelMask::open(&mask_path).unwrap();
    let area = table.feature_column(1, "Area").unwrap();
    let raster = backmap_u8(&mask, &area).unwrap();

    assert_eq!(raster.get(1, 0), Some(0));
    assert_eq!(raster.get(0, 1), Some(255));
    assert!(raster.is_background(0, 0));

    let img = render::colorize(&raster, Colormap::Viridis).unwrap();
    render::save_png(&img, &out_path).unwrap();
    let written = image::open(&out_path).unwrap().to_rgba8();
    assert_eq!(written.get_pixel(0, 0)[3], 0);
    assert_eq!(written.get_pixel(1, 0)[3], 255);
}

#[test]
fn test_feature_count_must_match_mask() {
    let dir = tempfile::tempdir().unwrap();
    let table_path = dir.path().join("cells.json");
    std::fs::write(
        &table_path,
        r#"[{"ImageNumber": 1, "ObjectNumber": 1, "Area": 1.0},
            {"ImageNumber": 1, "ObjectNumber": 2, "Area": 2.0},
            {"ImageNumber": 1, "ObjectNumber": 3, "Area": 3.0}]"#,
    )
    .unwrap();
    let table = load_table(&table_path, &LoaderOptions::default()).unwrap();
    let mask = LabelMask::from_rows(&[[1u32, 2], [3, 4]]).unwrap();

    let area = table.feature_column(1, "Area").unwrap();
    assert_eq!(
        backmap_u8(&mask, &area),
        Err(BackmapError::ShapeMismatch {
            features: 3,
            objects: 4
        })
    );

    let mut session = ViewSession::new(table);
    session.add_mask(1, mask);
    session.select_image(1);
    session.select_feature("Area");
    assert!(session.raster.is_none());
    assert_eq!(
        session.status_message.as_deref(),
        Some("3 feature values for 4 objects in the mask")
    );
}

#[test]
fn test_derived_column_is_backmapped() {
    let dir = tempfile::tempdir().unwrap();
    let table_path = dir.path().join("cells.csv");
    std::fs::write(
        &table_path,
        "ImageNumber,ObjectNumber,Area\n1,1,10\n1,2,10\n1,3,10\n",
    )
    .unwrap();
    let table = load_table(&table_path, &LoaderOptions::default()).unwrap();

    // Cluster assignments computed elsewhere come back as a new column.
    let clusters = vec![
        cellmap::data::model::MetadataValue::Integer(2),
        cellmap::data::model::MetadataValue::Integer(0),
        cellmap::data::model::MetadataValue::Integer(2),
    ];
    let labelled = table.with_column("cluster", clusters).unwrap();
    let mask = LabelMask::from_rows(&[[1u32, 2, 3]]).unwrap();

    let area = backmap_u8(&mask, &labelled.feature_column(1, "Area").unwrap()).unwrap();
    assert_eq!(area.condition(), Condition::DegenerateRange);

    let cluster = backmap_u8(&mask, &labelled.feature_column(1, "cluster").unwrap()).unwrap();
    assert_eq!(cluster.values(), &[255, 0, 255]);
    let img = render::colorize(&cluster, Colormap::Categorical).unwrap();
    assert_eq!(img.get_pixel(0, 0), img.get_pixel(2, 0));
    assert_ne!(img.get_pixel(0, 0), img.get_pixel(1, 0));
}
