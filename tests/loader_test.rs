use std::io::Cursor;

use forge_render::{
    data_structures::{SkyboxId, TextureId},
    resources::loader::ResourceLoader,
};

use crate::common::test_utils::{DeviceCall, TestScene, initialized_system, render_frame, small_settings};

mod common;

fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

#[test]
fn decoded_texture_is_uploaded_when_the_queue_drains() {
    let mut system = initialized_system(small_settings());
    let mut loader = ResourceLoader::new(system.upload_sender()).expect("runtime");

    let rx = loader.load_texture(
        TextureId(1),
        "red".to_string(),
        png(8, 8, [255, 0, 0, 255]),
        Some("png".to_string()),
        4,
    );
    loader.wait_idle();
    let texture = futures::executor::block_on(rx)
        .expect("sender kept")
        .expect("decoded");
    assert_eq!((texture.width, texture.height), (4, 4));

    let registry = system.registry().expect("initialized");
    assert_eq!(registry.texture_slot(TextureId(1)), None);

    assert_eq!(system.process_uploads(), 1);
    assert_eq!(
        system
            .registry()
            .and_then(|registry| registry.texture_slot(TextureId(1))),
        Some(0)
    );
}

#[test]
fn undecodable_texture_queues_no_upload() {
    let mut system = initialized_system(small_settings());
    let mut loader = ResourceLoader::new(system.upload_sender()).expect("runtime");

    let rx = loader.load_texture(
        TextureId(1),
        "garbage".to_string(),
        vec![1, 2, 3, 4],
        None,
        4,
    );
    loader.wait_idle();
    assert!(futures::executor::block_on(rx)
        .expect("sender kept")
        .is_err());
    assert_eq!(system.process_uploads(), 0);
}

#[test]
fn uploads_run_in_submission_order_at_frame_start() {
    let mut system = initialized_system(small_settings());
    let mut loader = ResourceLoader::new(system.upload_sender()).expect("runtime");

    let faces = std::array::from_fn(|face| png(2, 2, [face as u8 * 40, 0, 0, 255]));
    let skybox = loader.load_skybox(SkyboxId(9), faces, 2);
    loader.wait_idle();
    let texture = loader.load_texture(
        TextureId(2),
        "green".to_string(),
        png(4, 4, [0, 255, 0, 255]),
        None,
        4,
    );
    loader.wait_idle();
    assert_eq!(loader.pending(), 0);
    assert!(futures::executor::block_on(skybox).expect("sender kept").is_ok());
    assert!(futures::executor::block_on(texture).expect("sender kept").is_ok());

    render_frame(&mut system, &TestScene::new());
    assert_eq!(system.stats().uploads, 2);

    let registry = system.registry().expect("initialized");
    let cubemap = registry.skybox(SkyboxId(9)).expect("uploaded").cubemap;
    assert_eq!(registry.texture_slot(TextureId(2)), Some(0));

    let calls = &system.device().calls;
    let cube_write = calls
        .iter()
        .position(|call| matches!(call, DeviceCall::WriteTextureLayer { texture, .. } if *texture == cubemap))
        .expect("cubemap written");
    let slot_write = calls
        .iter()
        .position(|call| {
            matches!(call, DeviceCall::WriteTextureLayer { texture, .. } if *texture == registry.slots().texture())
        })
        .expect("slot written");
    assert!(cube_write < slot_write);
}

#[test]
fn finished_jobs_are_not_tracked_forever() {
    let system = initialized_system(small_settings());
    let mut loader = ResourceLoader::new(system.upload_sender()).expect("runtime");

    for id in 0..8 {
        let rx = loader.load_texture(
            TextureId(id),
            format!("texture {id}"),
            png(2, 2, [0, 0, 255, 255]),
            None,
            4,
        );
        assert!(futures::executor::block_on(rx).expect("sender kept").is_ok());
    }
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while loader.pending() > 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(loader.pending(), 0);

    let rx = loader.load_texture(TextureId(99), "last".to_string(), png(2, 2, [255; 4]), None, 4);
    assert_eq!(loader.tracked(), 1);
    loader.wait_idle();
    assert!(futures::executor::block_on(rx).expect("sender kept").is_ok());
    assert_eq!(loader.tracked(), 0);
}
