use super::task::Task;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Upper bound on elements processed between two cancellation checks.
pub const MAX_CHUNK_SIZE: usize = 4096;

fn worker_count() -> usize {
    #[cfg(feature = "parallel")]
    {
        rayon::current_num_threads()
    }
    #[cfg(not(feature = "parallel"))]
    {
        1
    }
}

pub fn chunk_size(len: usize) -> usize {
    (len / (worker_count() * 4)).clamp(1, MAX_CHUNK_SIZE)
}

/// Fills `output[i] = f(i)` for every index, splitting the range into chunks
/// that run on the worker pool.
///
/// Each chunk checks the task's cancellation flag before it starts and
/// advances the task's progress when it is done. Returns `Ok(false)` if the
/// run was canceled; the first error raised by `f` aborts the run.
pub fn parallel_map<T, E, F>(output: &mut [T], task: &Task, f: F) -> Result<bool, E>
where
    T: Send,
    E: Send,
    F: Fn(usize) -> Result<T, E> + Sync,
{
    let chunk = chunk_size(output.len());
    let process = |(chunk_index, slice): (usize, &mut [T])| -> Result<(), E> {
        if task.is_canceled() {
            return Ok(());
        }
        let base = chunk_index * chunk;
        for (offset, slot) in slice.iter_mut().enumerate() {
            *slot = f(base + offset)?;
        }
        task.increment_progress_value(slice.len() as u64);
        Ok(())
    };

    #[cfg(not(feature = "parallel"))]
    output.chunks_mut(chunk).enumerate().try_for_each(process)?;

    #[cfg(feature = "parallel")]
    output.par_chunks_mut(chunk).enumerate().try_for_each(process)?;

    Ok(!task.is_canceled())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_map_fills_every_slot() {
        let task = Task::new();
        let mut squares = vec![0usize; 10_000];
        let completed = parallel_map(&mut squares, &task, |i| Ok::<_, ()>(i * i)).unwrap();
        assert!(completed);
        assert!(squares.iter().enumerate().all(|(i, &v)| v == i * i));
        assert_eq!(task.progress_value(), 10_000);
    }

    #[test]
    fn parallel_map_propagates_errors() {
        let task = Task::new();
        let mut out = vec![0; 100];
        let result = parallel_map(&mut out, &task, |i| if i == 42 { Err(i) } else { Ok(i) });
        assert_eq!(result, Err(42));
    }

    #[test]
    fn canceled_task_stops_early() {
        let task = Task::new();
        task.cancel();
        let mut out = vec![7u8; 50_000];
        let completed = parallel_map(&mut out, &task, |_| Ok::<_, ()>(1)).unwrap();
        assert!(!completed);
        assert!(out.iter().all(|&v| v == 7));
    }

    #[test]
    fn chunk_size_is_bounded() {
        assert_eq!(chunk_size(0), 1);
        assert!(chunk_size(100_000_000) <= MAX_CHUNK_SIZE);
    }
}
