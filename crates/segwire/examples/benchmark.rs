use segwire::{
    FrameRequest, FrameWorker, InferenceBackend, ModelInput, Pipeline, PipelineConfig,
    QueuePolicy, RawOutputs, RawTensor, Result, ScalingContext,
};
use std::sync::Arc;
use std::time::Instant;

/// Stands in for the model: a fixed frame of 100 detections with 160x160 masks
struct SyntheticBackend {
    outputs: RawOutputs<'static>,
}

impl SyntheticBackend {
    fn new(count: usize, mask_side: usize) -> Self {
        let mut labels = Vec::with_capacity(count);
        let mut dets = Vec::with_capacity(count * 5);
        let mut masks = Vec::with_capacity(count * mask_side * mask_side);

        for i in 0..count {
            let x = (i % 10) as f32 * 60.0;
            let y = (i / 10) as f32 * 60.0;
            labels.push((i % 80) as i64);
            dets.extend_from_slice(&[x, y, x + 80.0, y + 80.0, 1.0 - i as f32 / count as f32]);

            // Filled disc centred in the detection's cell
            let cx = (x + 40.0) / 4.0;
            let cy = (y + 40.0) / 4.0;
            for my in 0..mask_side {
                for mx in 0..mask_side {
                    let d = (mx as f32 - cx).hypot(my as f32 - cy);
                    masks.push(if d < 9.0 { 1.0 } else { 0.0 });
                }
            }
        }

        let outputs = RawOutputs::new(vec![
            RawTensor::from_i64("labels", vec![1, count], &labels),
            RawTensor::from_f32("dets", vec![1, count, 5], &dets),
            RawTensor::from_f32("masks", vec![1, count, mask_side, mask_side], &masks),
        ]);
        Self { outputs }
    }
}

impl InferenceBackend for SyntheticBackend {
    fn infer(&mut self, _input: &ModelInput) -> Result<RawOutputs<'static>> {
        Ok(self.outputs.clone())
    }
}

fn main() {
    segwire::logging::init();

    let config = PipelineConfig {
        confidence_threshold: 0.25,
        iou_threshold: 0.45,
        ..Default::default()
    };

    println!("Creating pipeline (model side {})", config.model_side);
    let pipeline = match Pipeline::new(config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            eprintln!("Failed to create pipeline: {}", e);
            std::process::exit(1);
        }
    };

    let backend = SyntheticBackend::new(100, 160);
    let worker = match FrameWorker::spawn(Arc::clone(&pipeline), backend, QueuePolicy::default()) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("Failed to start worker: {}", e);
            std::process::exit(1);
        }
    };

    let (width, height) = (1920u32, 1080u32);
    let request = |i: i64| FrameRequest {
        input: ModelInput::zeros(640),
        context: ScalingContext::new(width, height),
        timestamp_ms: Some(i),
    };

    println!("\nRunning warmup pass...");
    let _ = worker.submit(request(0)).and_then(|t| t.wait());

    let iterations = 10u128;
    println!("\nBenchmarking {} frames at {}x{}...", iterations, width, height);
    let mut total_time = 0u128;

    for i in 0..iterations {
        let start = Instant::now();
        let output = match worker.submit(request(i as i64)).and_then(|t| t.wait()) {
            Ok(o) => o,
            Err(e) => {
                eprintln!("Frame {} failed: {}", i, e);
                continue;
            }
        };
        let elapsed = start.elapsed();
        total_time += elapsed.as_micros();

        let stats = output.stats;
        println!("\nFrame {}: {:?}", i, elapsed);
        println!("  Decode:      {:6} μs", stats.decode_us);
        println!("  Suppress:    {:6} μs", stats.suppress_us);
        println!("  Map:         {:6} μs", stats.map_us);
        println!("  Encode:      {:6} μs", stats.encode_us);
        println!("  Total:       {:6} μs", stats.total_us);
        println!(
            "  Detections:  {} (raw: {}, candidates: {})",
            stats.detections_final, stats.detections_raw, stats.candidates
        );
        println!("  Points:      {}", output.wire.point_count());
    }

    worker.shutdown();

    let avg_time = total_time / iterations;
    let fps = 1_000_000.0 / avg_time.max(1) as f64;

    println!("\n=== Results ===");
    println!("Average latency: {} μs ({:.2} ms)", avg_time, avg_time as f64 / 1000.0);
    println!("Throughput: {:.1} FPS", fps);
}
