//! End-to-end checks of the stereo pipeline on the software backend.

use vr_stereo::eye::Eye;
use vr_stereo::{
    detect_profile, DistortionProfile, FrameState, HmdInfo, NoHmd, RenderSession, SceneKind,
    SeparationStep, SoftwareBackend, StereoFrameDriver,
};

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

fn driver(
    present: (u32, u32),
    offscreen: (u32, u32),
    profile: DistortionProfile,
    scene: SceneKind,
) -> StereoFrameDriver<SoftwareBackend> {
    let backend = SoftwareBackend::new(present, offscreen).unwrap();
    let session = RenderSession::new(profile, FrameState::default(), scene);
    StereoFrameDriver::new(backend, session)
}

fn pixels(driver: &StereoFrameDriver<SoftwareBackend>) -> (u32, Vec<[u8; 4]>) {
    let image = driver.backend().present_image();
    (image.width(), image.to_rgba8())
}

#[test]
fn no_hmd_solid_red_fills_both_halves() {
    let profile = detect_profile(&NoHmd, (1280, 800));
    let mut driver = driver((1280, 800), (512, 512), profile, SceneKind::Solid { color: RED });

    assert_eq!(driver.render_frame().unwrap(), 0);

    let (_, pixels) = pixels(&driver);
    assert_eq!(pixels.len(), 1280 * 800);
    assert!(pixels.iter().all(|p| *p == [255, 0, 0, 255]));
    assert_eq!(driver.backend().frames_presented(), 1);
}

#[test]
fn eye_colors_split_at_the_middle_column() {
    let mut driver = driver(
        (1280, 800),
        (512, 512),
        DistortionProfile::identity(),
        SceneKind::EyeColors {
            left: RED,
            right: GREEN,
        },
    );
    driver.render_frame().unwrap();

    let (width, pixels) = pixels(&driver);
    for y in [0, 400, 799] {
        let row = (y * width) as usize;
        assert_eq!(pixels[row + 639], [255, 0, 0, 255], "row {y}");
        assert_eq!(pixels[row + 640], [0, 255, 0, 255], "row {y}");
    }
}

#[test]
fn distorted_eyes_never_leak_into_each_other() {
    let profile = detect_profile(&Some(HmdInfo::dk1()), (640, 400));
    assert!(profile.scale() > 1.0);
    let mut driver = driver(
        (640, 400),
        (128, 128),
        profile,
        SceneKind::EyeColors {
            left: RED,
            right: GREEN,
        },
    );
    driver.render_frame().unwrap();

    let (width, pixels) = pixels(&driver);
    let mut transparent = 0;
    for (i, p) in pixels.iter().enumerate() {
        let x = i as u32 % width;
        if *p == [0, 0, 0, 0] {
            transparent += 1;
        } else if x < width / 2 {
            assert_eq!(p[1], 0, "green in left half at {i}");
        } else {
            assert_eq!(p[0], 0, "red in right half at {i}");
        }
    }
    // barrel warp leaves the corners empty
    assert!(transparent > 0);
    assert_eq!(pixels[0], [0, 0, 0, 0]);
    assert_eq!(pixels[(200 * width + 160) as usize], [255, 0, 0, 255]);
    assert_eq!(pixels[(200 * width + 480) as usize], [0, 255, 0, 255]);
}

#[test]
fn separation_step_only_moves_the_scene() {
    let profile = detect_profile(&Some(HmdInfo::dk1()), (1280, 800));
    let mut session = RenderSession::new(profile, FrameState::new(6.4), SceneKind::AoBench);

    let before_scene = session.scene_params(Eye::Left, (512, 512));
    let before_uniforms = [Eye::Left, Eye::Right].map(|eye| session.distortion_uniforms(eye, (1280, 800)));

    session.adjust_separation(SeparationStep::Increase);

    let after_scene = session.scene_params(Eye::Left, (512, 512));
    let after_uniforms = [Eye::Left, Eye::Right].map(|eye| session.distortion_uniforms(eye, (1280, 800)));

    assert!((after_scene.eye_offset - 6.41).abs() < 1e-5);
    assert!((session.scene_params(Eye::Right, (512, 512)).eye_offset + 6.41).abs() < 1e-5);
    assert_eq!(before_uniforms, after_uniforms);
    assert_eq!(before_scene.time, after_scene.time);
    assert_eq!(before_scene.view, after_scene.view);
}

#[test]
fn aobench_parallax_differs_between_eyes() {
    let mut driver = driver((128, 64), (48, 48), DistortionProfile::identity(), SceneKind::AoBench);
    driver.render_frame().unwrap();

    let (width, pixels) = pixels(&driver);
    let half = width / 2;
    let mut differing = 0;
    for y in 0..64 {
        for x in 0..half {
            let left = pixels[(y * width + x) as usize];
            let right = pixels[(y * width + x + half) as usize];
            assert_eq!(left[3], 255);
            if left != right {
                differing += 1;
            }
        }
    }
    assert!(differing > 0);
}

#[test]
fn profile_replacement_applies_on_the_next_frame() {
    let mut driver = driver(
        (320, 200),
        (64, 64),
        DistortionProfile::identity(),
        SceneKind::Solid { color: RED },
    );
    driver.render_frame().unwrap();
    assert!(pixels(&driver).1.iter().all(|p| *p == [255, 0, 0, 255]));

    let dk1 = detect_profile(&Some(HmdInfo::dk1()), (320, 200));
    driver.session_mut().replace_profile(dk1);
    assert_eq!(driver.session().profile_epoch(), 1);

    driver.render_frame().unwrap();
    assert_eq!(pixels(&driver).1[0], [0, 0, 0, 0]);
}
