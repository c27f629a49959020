//! Golden summaries of full-width models.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use burn_ndarray::NdArray;
use ml_checkpoint::SummaryRecord;
use ml_models::export_store;
use ml_models::prelude::*;

type TestBackend = NdArray<f32>;

fn record(kind: &str, scope: &str, shapes: &[&[usize]], depth: usize) -> SummaryRecord {
    SummaryRecord {
        kind: kind.to_string(),
        scope: scope.to_string(),
        shapes: shapes.iter().map(|s| s.to_vec()).collect(),
        depth,
    }
}

fn norm(scope: &str, channels: usize, depth: usize) -> SummaryRecord {
    let shape: &[usize] = &[channels];
    record("BatchNorm", scope, &[shape, shape, shape, shape], depth)
}

#[test]
fn mobilenet_v2_summary() {
    let model = MobileNetV2::<TestBackend>::new(&MobileNetV2Config::default(), &Default::default()).unwrap();
    let summary = summarize(&model);
    let records = summary.records();

    let head = vec![
        record("MobileNetV2", "model", &[], 0),
        record("ZeroPadding2D", "model/inputPad", &[], 1),
        record("Conv2D", "model/inputConv", &[&[32, 3, 3, 3], &[32]], 1),
        norm("model/inputConvBN", 32, 1),
        record("InitialInvertedBottleneckBlock", "model/initBottleneck", &[], 1),
        record("DepthwiseConv2D", "model/initBottleneck/dConv", &[&[32, 1, 3, 3], &[32]], 2),
        norm("model/initBottleneck/dConvBN", 32, 2),
        record("Conv2D", "model/initBottleneck/conv2", &[&[16, 32, 1, 1], &[16]], 2),
        norm("model/initBottleneck/convBN", 16, 2),
        record("InvertedBottleneckBlockStack", "model/residual1", &[], 1),
        record("InvertedBottleneckBlock", "model/residual1/blocks/h0", &[], 2),
        record("Conv2D", "model/residual1/blocks/h0/conv1", &[&[96, 16, 1, 1], &[96]], 3),
        norm("model/residual1/blocks/h0/conv1BN", 96, 3),
        record("ZeroPadding2D", "model/residual1/blocks/h0/zeroPad", &[], 3),
        record("DepthwiseConv2D", "model/residual1/blocks/h0/dConv", &[&[96, 1, 3, 3], &[96]], 3),
    ];
    assert_eq!(&records[..head.len()], head.as_slice());

    let tail = vec![
        record("Conv2D", "model/outputConv", &[&[1280, 320, 1, 1], &[1280]], 1),
        norm("model/outputConvBN", 1280, 1),
        record("GlobalAvgPool2D", "model/avgPool", &[], 1),
        record("Dense", "model/outputClassifier", &[&[1280, 1000], &[1000]], 1),
    ];
    assert_eq!(&records[records.len() - tail.len()..], tail.as_slice());

    let stacks = records.iter().filter(|r| r.kind == "InvertedBottleneckBlockStack").count();
    let blocks = records.iter().filter(|r| r.kind == "InvertedBottleneckBlock").count();
    assert_eq!(stacks, 5);
    assert_eq!(blocks, 16);

    // Reference parameter count plus one zero bias per convolution channel.
    assert_eq!(summary.total_parameters(), 3_538_984 + 17_056);
    assert_eq!(summary.total_parameters(), export_store(&model).parameter_count());
    assert!(summary.render_table().ends_with("Total params: 3556040\n"));
}

#[test]
fn posture_net_v2_summary() {
    let model = PostureNetV2::<TestBackend>::new(&PostureNetV2Config::default(), &Default::default()).unwrap();
    let summary = summarize(&model);
    let records = summary.records();

    let head = vec![
        record("PostureNetV2", "model", &[], 0),
        record("ZeroPadding2D", "model/inputPad", &[], 1),
        record("Conv2D", "model/inputConv", &[&[32, 3, 3, 3], &[32]], 1),
        norm("model/inputConvBN", 32, 1),
        record("ReLU", "model/inputReLU", &[], 1),
        record("InvertedResidualBlock", "model/expanded", &[], 1),
        record("DepthwiseConv2D", "model/expanded/dConv", &[&[32, 1, 3, 3], &[32]], 2),
        norm("model/expanded/dConvBN", 32, 2),
        record("ReLU", "model/expanded/dConvReLU", &[], 2),
        record("Conv2D", "model/expanded/conv2", &[&[16, 32, 1, 1], &[16]], 2),
        norm("model/expanded/conv2BN", 16, 2),
        record("InvertedResidualBlock", "model/block_1", &[], 1),
        record("Conv2D", "model/block_1/conv1", &[&[96, 16, 1, 1], &[96]], 2),
    ];
    assert_eq!(&records[..head.len()], head.as_slice());

    let tail = vec![
        record("Conv2D", "model/outputConv", &[&[1280, 320, 1, 1], &[1280]], 1),
        norm("model/outputConvBN", 1280, 1),
        record("ReLU", "model/outputConvReLU", &[], 1),
        record("GlobalAvgPool2D", "model/avgPool", &[], 1),
        record("Dense", "model/outputClassifier", &[&[1280, 2], &[2]], 1),
    ];
    assert_eq!(&records[records.len() - tail.len()..], tail.as_slice());

    let adds: Vec<&str> = records
        .iter()
        .filter(|r| r.kind == "Add")
        .map(|r| r.scope.as_str())
        .collect();
    assert_eq!(adds.len(), 10);
    assert_eq!(adds[0], "model/block_2/add");

    assert_eq!(summary.total_parameters(), 2_277_602);
}
