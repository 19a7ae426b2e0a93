//! End-to-end checks of the public operations on known inputs.

use vision_utils::api::{
    self, AssembleBatchOptions, DetectionInput, FrameOptions, LetterboxOptions, NmsOptions,
    PixelDataOptions, PixelDataRequest, QuantizeOptions, ResizeOptions, ReverseLetterboxOptions,
    TensorData,
};
use vision_utils::processors::{
    ColorFormat, PixelBuffer, QuantDtype, QuantizedData, ResizeStrategy, Rotation, yuv_to_rgb,
};
use vision_utils::{BoxFormat, DataLayout, ErrorCode};

#[test]
fn letterbox_landscape_into_square() {
    let frame = PixelBuffer::filled(1920, 1080, ColorFormat::Grayscale, &[50]);
    let response = api::letterbox(&frame, &LetterboxOptions::new(640, 640).with_scale_up(false))
        .unwrap();
    let t = response.transform;
    assert!((t.scale - 1.0 / 3.0).abs() < 1e-6);
    assert_eq!((t.pad_x, t.pad_y), (0, 140));
    assert_eq!((response.buffer.width, response.buffer.height), (640, 640));
    // Padding rows above and below the 360 content rows.
    assert_eq!(response.buffer.at(0, 139, 0), 114);
    assert_eq!(response.buffer.at(0, 140, 0), 50);
    assert_eq!(response.buffer.at(0, 499, 0), 50);
    assert_eq!(response.buffer.at(0, 500, 0), 114);

    // A detection in letterboxed space maps back into the 1920x1080 frame.
    let back = api::reverse_letterbox(
        &[vec![0.0, 140.0, 640.0, 500.0]],
        &ReverseLetterboxOptions {
            scale: t.scale,
            pad_x: t.pad_x as f32,
            pad_y: t.pad_y as f32,
            ..Default::default()
        },
    )
    .unwrap();
    let expected = [0.0, 0.0, 1920.0, 1080.0];
    for (got, want) in back.boxes[0].iter().zip(expected) {
        assert!((got - want).abs() < 0.01, "{got} vs {want}");
    }
}

#[test]
fn box_format_conversion() {
    let r = api::convert_box_format(
        &[vec![100.0, 100.0, 200.0, 200.0]],
        BoxFormat::Xyxy,
        BoxFormat::Xywh,
    )
    .unwrap();
    assert_eq!(r.boxes, vec![[100.0, 100.0, 100.0, 100.0]]);
}

#[test]
fn nms_keeps_best_and_disjoint() {
    let detections = vec![
        DetectionInput::new(vec![100.0, 100.0, 200.0, 200.0], 0.9),
        DetectionInput::new(vec![110.0, 110.0, 210.0, 210.0], 0.8),
        DetectionInput::new(vec![300.0, 300.0, 400.0, 400.0], 0.7),
    ];
    let options = NmsOptions {
        iou_threshold: Some(0.5),
        ..Default::default()
    };
    let result = api::non_max_suppression(&detections, &options).unwrap();
    assert_eq!(result.indices, vec![0, 2]);
    assert_eq!(result.suppressed_count, 1);
}

#[test]
fn uint8_quantization_of_unit_range() {
    let scale = 1.0f32 / 255.0;
    let data = [0.0f32, 0.25, 0.5, 0.75, 1.0];
    let options = QuantizeOptions::per_tensor(QuantDtype::Uint8, scale, 0);
    let response = api::quantize(&data, &options).unwrap();

    let expected: Vec<u8> = data.iter().map(|x| (x / scale).round() as u8).collect();
    assert_eq!(response.data, QuantizedData::Uint8(expected.clone()));
    assert_eq!(&expected[..2], &[0, 64]);
    assert_eq!(&expected[3..], &[191, 255]);

    let ints: Vec<i64> = expected.iter().map(|&q| q as i64).collect();
    let back = api::dequantize(&ints, &options).unwrap();
    for (x, y) in data.iter().zip(&back.data) {
        assert!((x - y).abs() <= scale / 2.0 + 1e-6);
    }
}

#[test]
fn assemble_two_pixels_nhwc() {
    let a = PixelBuffer::new(1, 1, ColorFormat::Rgb, DataLayout::Hwc, vec![0.1f32, 0.2, 0.3]).unwrap();
    let b = PixelBuffer::new(1, 1, ColorFormat::Rgb, DataLayout::Hwc, vec![0.4f32, 0.5, 0.6]).unwrap();
    let batch = api::assemble_batch(
        &[a, b],
        &AssembleBatchOptions {
            layout: Some(DataLayout::Nhwc),
            pad_to_size: None,
        },
    )
    .unwrap();
    assert_eq!(batch.shape, vec![2, 1, 1, 3]);
    assert_eq!(batch.batch_size, 2);
    assert_eq!(batch.data, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
}

#[test]
fn assemble_rejects_mismatched_sizes() {
    let a = PixelBuffer::new(1, 1, ColorFormat::Rgb, DataLayout::Hwc, vec![0.0f32; 3]).unwrap();
    let b = PixelBuffer::new(2, 1, ColorFormat::Rgb, DataLayout::Hwc, vec![0.0f32; 6]).unwrap();
    let err = api::assemble_batch(&[a, b], &AssembleBatchOptions::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DimensionMismatch);
    assert!(err.to_string().contains("index 1"));
}

/// 4x2 NV12 frame with row padding: luma ramps, one chroma pair per 2x2 block.
fn nv12_frame() -> PixelDataRequest {
    let stride = 6;
    let mut data = Vec::new();
    for row in [[10u8, 20, 30, 40], [50, 60, 70, 80]] {
        data.extend(row);
        data.extend([0, 0]);
    }
    data.extend([100, 150, 200, 50, 0, 0]);
    PixelDataRequest::new(data, FrameOptions::new(4, 2, "nv12").with_bytes_per_row(stride))
}

#[test]
fn nv12_pipeline_raw_values() {
    let request = nv12_frame().with_options(PixelDataOptions {
        normalization: Some(vision_utils::processors::NormalizationSpec {
            preset: Some(vision_utils::processors::NormalizationPreset::Raw),
            ..Default::default()
        }),
        ..Default::default()
    });
    let result = api::get_pixel_data(&request).unwrap();
    assert_eq!(result.shape, vec![2, 4, 3]);
    let TensorData::Float(values) = result.data else {
        panic!("expected float data");
    };
    let first = yuv_to_rgb(10, 100, 150);
    let last = yuv_to_rgb(80, 200, 50);
    assert_eq!(&values[..3], &first.map(f32::from));
    assert_eq!(&values[values.len() - 3..], &last.map(f32::from));
}

#[test]
fn rotated_letterboxed_quantized_pipeline() {
    let mut request = nv12_frame().with_options(PixelDataOptions {
        resize: Some(ResizeOptions::new(4, 4).with_strategy(ResizeStrategy::Letterbox)),
        color_format: Some(ColorFormat::Bgr),
        data_layout: Some(DataLayout::Nchw),
        quantization: Some(QuantizeOptions::per_tensor(QuantDtype::Uint8, 1.0 / 255.0, 0)),
        ..Default::default()
    });
    request.frame = request.frame.with_rotation(Rotation::Deg90);

    let result = api::get_pixel_data(&request).unwrap();
    assert_eq!(result.shape, vec![1, 3, 4, 4]);
    assert_eq!(result.color_format, ColorFormat::Bgr);
    // Rotated frame is 2x4, so the letterbox pads one column on each side.
    let transform = result.letterbox.unwrap();
    assert_eq!((transform.pad_x, transform.pad_y), (1, 0));
    assert_eq!((transform.original_width, transform.original_height), (2, 4));
    match result.data {
        TensorData::Quantized(QuantizedData::Uint8(values)) => {
            assert_eq!(values.len(), 48);
            assert_eq!(values[0], 114);
        }
        other => panic!("expected uint8 data, got {other:?}"),
    }
}

#[test]
fn batch_reports_failures_inline() {
    let good = nv12_frame();
    let mut bad_roi = nv12_frame();
    bad_roi.options.roi = Some(vision_utils::processors::Region::new(0, 0, 8, 8));

    let err = api::batch_get_pixel_data(
        &[good.clone(), bad_roi],
        &vision_utils::core::BatchPolicy::default(),
        None,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRoi);

    let result = api::batch_get_pixel_data(
        &vec![good; 5],
        &vision_utils::core::BatchPolicy::new().with_concurrency(2),
        None,
    )
    .unwrap();
    assert_eq!(result.succeeded, 5);
    assert_eq!(result.failed, 0);
}

#[test]
fn unsupported_inputs_have_stable_codes() {
    let err = api::convert_pixels(&[0; 16], &FrameOptions::new(2, 2, "p010")).unwrap_err();
    assert_eq!(err.code().as_str(), "UNSUPPORTED_FORMAT");

    let err = api::convert_pixels(&[0; 5], &FrameOptions::new(2, 2, "nv12")).unwrap_err();
    assert_eq!(err.code().as_str(), "BUFFER_TOO_SMALL");

    // Odd width: a 3-byte row cannot hold the second chroma pair.
    let odd = FrameOptions::new(3, 2, "nv21").with_bytes_per_row(3);
    let err = api::convert_pixels(&[16; 9], &odd).unwrap_err();
    assert_eq!(err.code().as_str(), "INVALID_DIMENSIONS");

    let err = "hsv".parse::<ColorFormat>().unwrap_err();
    assert_eq!(err.code().as_str(), "UNSUPPORTED_COLOR_SCHEME");

    let err = api::quantize(&[0.0], &QuantizeOptions::default()).unwrap_err();
    assert_eq!(err.code().as_str(), "MISSING_QUANTIZATION_PARAMS");
}
