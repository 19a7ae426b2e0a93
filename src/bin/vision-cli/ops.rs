//! JSON request envelopes and dispatch for every operation.

use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vision_utils::api::{
    self, AssembleBatchOptions, ClipBoxesOptions, DetectionInput, FrameOptions, LetterboxOptions,
    NmsOptions, PixelDataRequest, QuantizationParamsOptions, QuantizeOptions, ResizeOptions,
    ReverseLetterboxOptions, ScaleBoxesOptions, TensorGeometry,
};
use vision_utils::processors::{NormalizationSpec, PixelBuffer, Region, Tensor};
use vision_utils::{BoxFormat, VisionError, VisionResult};

/// Operations the CLI can run on a single JSON request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    PixelData,
    ConvertPixels,
    Resize,
    Normalize,
    Letterbox,
    ReverseLetterbox,
    Grayscale,
    Quantize,
    Dequantize,
    QuantizationParams,
    Permute,
    AssembleBatch,
    ConcatenateBatch,
    ConvertBoxes,
    ScaleBoxes,
    ClipBoxes,
    Iou,
    Nms,
    ExtractChannel,
    ExtractPatch,
    FiveCrop,
    TenCrop,
    TensorToImage,
}

#[derive(Deserialize)]
struct FrameRequest {
    data: Vec<u8>,
    #[serde(flatten)]
    frame: FrameOptions,
}

#[derive(Deserialize)]
struct BufferRequest<O> {
    buffer: PixelBuffer<u8>,
    #[serde(flatten)]
    options: O,
}

#[derive(Deserialize)]
struct DataRequest<T, O> {
    data: Vec<T>,
    #[serde(flatten)]
    options: O,
}

#[derive(Deserialize)]
struct BoxesRequest<O> {
    boxes: Vec<Vec<f32>>,
    #[serde(flatten)]
    options: O,
}

#[derive(Deserialize)]
struct PermuteRequest {
    data: Vec<f32>,
    shape: Vec<usize>,
    order: Vec<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssembleBatchRequest {
    buffers: Vec<PixelBuffer<f32>>,
    #[serde(flatten)]
    options: AssembleBatchOptions,
}

#[derive(Deserialize)]
struct ConcatenateRequest {
    tensors: Vec<Tensor<f32>>,
}

#[derive(Deserialize)]
struct ConvertBoxesRequest {
    boxes: Vec<Vec<f32>>,
    from: String,
    to: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IouRequest {
    box_a: Vec<f32>,
    box_b: Vec<f32>,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Deserialize)]
struct NmsRequest {
    detections: Vec<DetectionInput>,
    #[serde(flatten)]
    options: NmsOptions,
}

#[derive(Deserialize)]
struct ChannelRequest {
    data: Vec<f32>,
    #[serde(flatten)]
    geometry: TensorGeometry,
    channel: usize,
}

#[derive(Deserialize)]
struct PatchRequest {
    data: Vec<f32>,
    #[serde(flatten)]
    geometry: TensorGeometry,
    region: Region,
}

#[derive(Deserialize)]
struct CropRequest {
    buffer: PixelBuffer<u8>,
    width: i64,
    height: i64,
}

#[derive(Deserialize)]
struct TensorToImageRequest {
    tensor: PixelBuffer<f32>,
    #[serde(default)]
    normalization: NormalizationSpec,
}

#[derive(Deserialize)]
struct GrayscaleRequest {
    buffer: PixelBuffer<u8>,
}

/// Parses a request body, mapping malformed JSON to `INVALID_INPUT`.
pub fn parse<T: DeserializeOwned>(input: &str) -> VisionResult<T> {
    serde_json::from_str(input)
        .map_err(|e| VisionError::invalid_input(format!("malformed request: {e}")))
}

fn json<T: Serialize>(value: &T) -> VisionResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| VisionError::invalid_input(format!("unserializable response: {e}")))
}

fn box_format(name: Option<&str>) -> VisionResult<BoxFormat> {
    name.map_or(Ok(BoxFormat::default()), |n| n.parse())
}

/// Runs `operation` on a JSON request body.
pub fn dispatch(operation: Operation, input: &str) -> VisionResult<Value> {
    match operation {
        Operation::PixelData => {
            let request: PixelDataRequest = parse(input)?;
            json(&api::get_pixel_data(&request)?)
        }
        Operation::ConvertPixels => {
            let request: FrameRequest = parse(input)?;
            json(&api::convert_pixels(&request.data, &request.frame)?)
        }
        Operation::Resize => {
            let request: BufferRequest<ResizeOptions> = parse(input)?;
            json(&api::resize(&request.buffer, &request.options)?)
        }
        Operation::Normalize => {
            let request: BufferRequest<NormalizationSpec> = parse(input)?;
            json(&api::normalize(&request.buffer, &request.options)?)
        }
        Operation::Letterbox => {
            let request: BufferRequest<LetterboxOptions> = parse(input)?;
            json(&api::letterbox(&request.buffer, &request.options)?)
        }
        Operation::ReverseLetterbox => {
            let request: BoxesRequest<ReverseLetterboxOptions> = parse(input)?;
            json(&api::reverse_letterbox(&request.boxes, &request.options)?)
        }
        Operation::Grayscale => {
            let request: GrayscaleRequest = parse(input)?;
            json(&api::to_grayscale(&request.buffer)?)
        }
        Operation::Quantize => {
            let request: DataRequest<f32, QuantizeOptions> = parse(input)?;
            json(&api::quantize(&request.data, &request.options)?)
        }
        Operation::Dequantize => {
            let request: DataRequest<i64, QuantizeOptions> = parse(input)?;
            json(&api::dequantize(&request.data, &request.options)?)
        }
        Operation::QuantizationParams => {
            let request: DataRequest<f32, QuantizationParamsOptions> = parse(input)?;
            json(&api::calculate_quantization_params(
                &request.data,
                &request.options,
            )?)
        }
        Operation::Permute => {
            let request: PermuteRequest = parse(input)?;
            json(&api::permute(&request.data, &request.shape, &request.order)?)
        }
        Operation::AssembleBatch => {
            let request: AssembleBatchRequest = parse(input)?;
            json(&api::assemble_batch(&request.buffers, &request.options)?)
        }
        Operation::ConcatenateBatch => {
            let request: ConcatenateRequest = parse(input)?;
            json(&api::concatenate_to_batch(&request.tensors)?)
        }
        Operation::ConvertBoxes => {
            let request: ConvertBoxesRequest = parse(input)?;
            json(&api::convert_box_format(
                &request.boxes,
                request.from.parse()?,
                request.to.parse()?,
            )?)
        }
        Operation::ScaleBoxes => {
            let request: BoxesRequest<ScaleBoxesOptions> = parse(input)?;
            json(&api::scale_boxes(&request.boxes, &request.options)?)
        }
        Operation::ClipBoxes => {
            let request: BoxesRequest<ClipBoxesOptions> = parse(input)?;
            json(&api::clip_boxes(&request.boxes, &request.options)?)
        }
        Operation::Iou => {
            let request: IouRequest = parse(input)?;
            let format = box_format(request.format.as_deref())?;
            json(&api::calculate_iou(&request.box_a, &request.box_b, format)?)
        }
        Operation::Nms => {
            let request: NmsRequest = parse(input)?;
            json(&api::non_max_suppression(&request.detections, &request.options)?)
        }
        Operation::ExtractChannel => {
            let request: ChannelRequest = parse(input)?;
            json(&api::extract_channel(
                &request.data,
                &request.geometry,
                request.channel,
            )?)
        }
        Operation::ExtractPatch => {
            let request: PatchRequest = parse(input)?;
            json(&api::extract_patch(
                &request.data,
                &request.geometry,
                request.region,
            )?)
        }
        Operation::FiveCrop => {
            let request: CropRequest = parse(input)?;
            json(&api::five_crop(&request.buffer, request.width, request.height)?)
        }
        Operation::TenCrop => {
            let request: CropRequest = parse(input)?;
            json(&api::ten_crop(&request.buffer, request.width, request.height)?)
        }
        Operation::TensorToImage => {
            let request: TensorToImageRequest = parse(input)?;
            json(&api::tensor_to_image(&request.tensor, &request.normalization)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vision_utils::ErrorCode;

    #[test]
    fn test_convert_boxes_unknown_format() {
        let err = dispatch(
            Operation::ConvertBoxes,
            r#"{"boxes": [[0, 0, 1, 1]], "from": "xyxy", "to": "polygon"}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidFormat);
    }

    #[test]
    fn test_nms_request() {
        let value = dispatch(
            Operation::Nms,
            r#"{
                "detections": [
                    {"box": [100, 100, 200, 200], "score": 0.9},
                    {"box": [110, 110, 210, 210], "score": 0.8},
                    {"box": [300, 300, 400, 400], "score": 0.7}
                ],
                "iouThreshold": 0.5
            }"#,
        )
        .unwrap();
        assert_eq!(value["indices"], serde_json::json!([0, 2]));
        assert_eq!(value["suppressedCount"], 1);
    }

    #[test]
    fn test_malformed_json() {
        let err = dispatch(Operation::Permute, "{").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }
}
