//! Property-based tests for box geometry, NMS, letterboxing and quantization.

use proptest::prelude::*;
use vision_utils::processors::geometry::{convert_box, iou_xyxy};
use vision_utils::processors::{
    BoxCoords, Detection, NmsConfig, QuantDtype, QuantMode, QuantParam, QuantizationSpec, calculate_iou,
    calculate_quantization_params, compute_letterbox, dequantize, non_max_suppression, quantize,
};
use vision_utils::{BoxFormat, DataLayout};

const FORMATS: [BoxFormat; 3] = [BoxFormat::Xyxy, BoxFormat::Xywh, BoxFormat::Cxcywh];
const DTYPES: [QuantDtype; 3] = [QuantDtype::Int8, QuantDtype::Uint8, QuantDtype::Int16];

/// Integer-valued `xyxy` box with positive size.
fn arb_int_box() -> impl Strategy<Value = BoxCoords> {
    (0u16..2000, 0u16..2000, 1u16..500, 1u16..500).prop_map(|(x, y, w, h)| {
        let (x, y, w, h) = (x as f32, y as f32, w as f32, h as f32);
        [x, y, x + w, y + h]
    })
}

fn arb_detection() -> impl Strategy<Value = Detection> {
    (arb_int_box(), 0.0f32..1.0).prop_map(|(b, score)| Detection::new(b, score))
}

fn arb_dtype() -> impl Strategy<Value = QuantDtype> {
    prop::sample::select(DTYPES.to_vec())
}

proptest! {
    #[test]
    fn box_conversion_round_trips(b in arb_int_box(), from in 0usize..3, to in 0usize..3) {
        let (from, to) = (FORMATS[from], FORMATS[to]);
        let start = convert_box(b, BoxFormat::Xyxy, from);
        let there = convert_box(start, from, to);
        prop_assert_eq!(convert_box(there, to, from), start);
    }

    #[test]
    fn iou_with_self_is_one(b in arb_int_box(), format in 0usize..3) {
        let format = FORMATS[format];
        let encoded = convert_box(b, BoxFormat::Xyxy, format);
        let result = calculate_iou(encoded, encoded, format);
        prop_assert!((result.iou - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero(b in arb_int_box(), gap in 0.0f32..100.0) {
        let shifted = [b[2] + gap, b[1], b[2] + gap + (b[2] - b[0]), b[3]];
        prop_assert_eq!(calculate_iou(b, shifted, BoxFormat::Xyxy).iou, 0.0);
    }

    #[test]
    fn iou_is_symmetric_and_bounded(a in arb_int_box(), b in arb_int_box()) {
        let ab = calculate_iou(a, b, BoxFormat::Xyxy).iou;
        let ba = calculate_iou(b, a, BoxFormat::Xyxy).iou;
        prop_assert_eq!(ab, ba);
        prop_assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn nms_invariants(
        detections in prop::collection::vec(arb_detection(), 0..40),
        iou_threshold in 0.1f32..0.9,
        score_threshold in 0.0f32..0.5,
    ) {
        let config = NmsConfig {
            iou_threshold,
            score_threshold,
            ..Default::default()
        };
        let result = non_max_suppression(&detections, &config).unwrap();

        let passing = detections.iter().filter(|d| d.score >= score_threshold).count();
        prop_assert_eq!(result.indices.len() + result.suppressed_count, passing);

        for pair in result.detections.windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
        for (i, a) in result.detections.iter().enumerate() {
            for b in &result.detections[i + 1..] {
                prop_assert!(iou_xyxy(&a.bbox, &b.bbox) <= iou_threshold);
            }
        }
        for (&index, kept) in result.indices.iter().zip(&result.detections) {
            prop_assert_eq!(&detections[index], kept);
        }
    }

    #[test]
    fn letterbox_inverse_recovers_boxes(
        from_w in 1u32..4000,
        from_h in 1u32..4000,
        to_w in 1u32..1024,
        to_h in 1u32..1024,
        scale_up in any::<bool>(),
        rel in prop::array::uniform4(0.0f32..1.0),
        format in 0usize..3,
    ) {
        let (transform, _) = compute_letterbox((from_w, from_h), (to_w, to_h), scale_up, true).unwrap();
        let (w, h) = (from_w as f32, from_h as f32);
        let (x1, x2) = (rel[0].min(rel[2]) * w, rel[0].max(rel[2]) * w);
        let (y1, y2) = (rel[1].min(rel[3]) * h, rel[1].max(rel[3]) * h);
        let format = FORMATS[format];
        let original = convert_box([x1, y1, x2, y2], BoxFormat::Xyxy, format);

        let forward = transform.forward(&[original], format);
        let back = transform.inverse(&forward, format, false).unwrap();
        for (got, want) in back[0].iter().zip(original) {
            prop_assert!((got - want).abs() <= 1.0, "{} vs {}", got, want);
        }
    }

    #[test]
    fn quantization_error_within_half_step(
        dtype in arb_dtype(),
        scale in 0.001f32..1.0,
        zero_point_frac in 0.0f32..1.0,
        fracs in prop::collection::vec(0.0f32..1.0, 1..64),
    ) {
        let (qmin, qmax) = (dtype.qmin(), dtype.qmax());
        let zero_point = qmin + ((qmax - qmin) as f32 * zero_point_frac) as i32;
        let lo = (qmin - zero_point) as f32 * scale;
        let hi = (qmax - zero_point) as f32 * scale;
        let data: Vec<f32> = fracs.iter().map(|f| lo + (hi - lo) * f).collect();

        let spec = QuantizationSpec::per_tensor(dtype, scale, zero_point);
        let back = dequantize(&quantize(&data, &spec).unwrap(), &spec).unwrap();
        for (x, y) in data.iter().zip(&back) {
            let tolerance = scale / 2.0 + 1e-4 * x.abs().max(1.0);
            prop_assert!((x - y).abs() <= tolerance, "{} -> {} (scale {})", x, y, scale);
        }
    }

    #[test]
    fn derived_params_per_channel_round_trip(
        dtype in arb_dtype(),
        symmetric in any::<bool>(),
        pixels in prop::collection::vec(prop::array::uniform3(-5.0f32..5.0), 1..32),
    ) {
        // Unsigned symmetric ranges cannot hold negative values.
        prop_assume!(!(symmetric && dtype == QuantDtype::Uint8));
        // Every channel sees 0 so the asymmetric zero point stays in range.
        let mut data: Vec<f32> = vec![0.0; 3];
        data.extend(pixels.iter().flatten());

        let params = calculate_quantization_params(
            &data,
            dtype,
            QuantMode::PerChannel,
            Some(3),
            DataLayout::Hwc,
            1,
            symmetric,
        )
        .unwrap();
        let spec = QuantizationSpec {
            dtype,
            mode: QuantMode::PerChannel,
            scale: params.scale.clone(),
            zero_point: params.zero_point.clone(),
            data_layout: DataLayout::Hwc,
            channels: Some(3),
            batch_size: 1,
        };
        let back = dequantize(&quantize(&data, &spec).unwrap(), &spec).unwrap();
        for (i, (x, y)) in data.iter().zip(&back).enumerate() {
            let step = params.scale.get(i % 3);
            prop_assert!((x - y).abs() <= step / 2.0 + 1e-4, "{} -> {} (step {})", x, y, step);
        }
    }

    #[test]
    fn planar_per_channel_round_trip(
        dtype in arb_dtype(),
        batched in any::<bool>(),
        batch_size in 1usize..4,
        plane in 1usize..12,
        params in prop::collection::vec((0.001f32..1.0, 0.0f32..1.0), 1..5),
        seed in prop::collection::vec(0.0f32..1.0, 1..400),
    ) {
        let (qmin, qmax) = (dtype.qmin(), dtype.qmax());
        let channels = params.len();
        let batch_size = if batched { batch_size } else { 1 };
        let layout = if batched { DataLayout::Nchw } else { DataLayout::Chw };
        let scales: Vec<f32> = params.iter().map(|&(s, _)| s).collect();
        let zero_points: Vec<i32> = params
            .iter()
            .map(|&(_, f)| qmin + ((qmax - qmin) as f32 * f) as i32)
            .collect();

        // Each element lies inside the range its own channel can represent.
        let channel_of = |i: usize| (i / plane) % channels;
        let len = batch_size * channels * plane;
        let data: Vec<f32> = (0..len)
            .map(|i| {
                let c = channel_of(i);
                let lo = (qmin - zero_points[c]) as f32 * scales[c];
                let hi = (qmax - zero_points[c]) as f32 * scales[c];
                lo + (hi - lo) * seed[i % seed.len()]
            })
            .collect();

        let spec = QuantizationSpec {
            dtype,
            mode: QuantMode::PerChannel,
            scale: QuantParam::PerChannel(scales.clone()),
            zero_point: QuantParam::PerChannel(zero_points),
            data_layout: layout,
            channels: Some(channels),
            batch_size,
        };
        let back = dequantize(&quantize(&data, &spec).unwrap(), &spec).unwrap();
        for (i, (x, y)) in data.iter().zip(&back).enumerate() {
            let step = scales[channel_of(i)];
            let tolerance = step / 2.0 + 1e-4 * x.abs().max(1.0);
            prop_assert!((x - y).abs() <= tolerance, "[{}] {} -> {} (step {})", i, x, y, step);
        }
    }
}
