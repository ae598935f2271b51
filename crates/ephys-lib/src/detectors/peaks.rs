use log::debug;

/// Default search half-window around a boundary, in milliseconds.
pub const SNAP_TOLERANCE_MS: f64 = 0.2;

/// Find the local extremum with the greatest absolute value inside
/// `[target_time - tolerance, target_time + tolerance]` and return its time.
///
/// Extrema are classified by the sign flip of the discrete slope on either
/// side of a sample, so monotonic regions and the window's boundary samples
/// never qualify. Returns `None` when fewer than 3 samples fall in the window
/// or when no slope flip occurs inside it. Ties on |value| go to the first
/// candidate in scan order.
pub fn find_peak_in_window(
    time_ms: &[f64],
    data: &[f64],
    target_time: f64,
    tolerance: f64,
) -> Option<f64> {
    let window_start = target_time - tolerance;
    let window_end = target_time + tolerance;

    let window: Vec<(f64, f64)> = time_ms
        .iter()
        .zip(data.iter())
        .filter(|(t, _)| **t >= window_start && **t <= window_end)
        .map(|(t, v)| (*t, *v))
        .collect();

    if window.len() < 3 {
        debug!(
            "peak search at {:.3} ms: only {} samples in window, need 3",
            target_time,
            window.len()
        );
        return None;
    }

    let mut best: Option<(f64, f64)> = None;
    for i in 1..window.len() - 1 {
        let (t_prev, v_prev) = window[i - 1];
        let (t, v) = window[i];
        let (t_next, v_next) = window[i + 1];
        let slope_before = (v - v_prev) / (t - t_prev);
        let slope_after = (v_next - v) / (t_next - t);

        let is_max = slope_before > 0.0 && slope_after < 0.0;
        let is_min = slope_before < 0.0 && slope_after > 0.0;
        if !(is_max || is_min) {
            continue;
        }
        let magnitude = v.abs();
        match best {
            Some((_, best_mag)) if magnitude <= best_mag => {}
            _ => best = Some((t, magnitude)),
        }
    }

    match best {
        Some((t, _)) => Some(t),
        None => {
            debug!("peak search at {:.3} ms: no local extremum in window", target_time);
            None
        }
    }
}
