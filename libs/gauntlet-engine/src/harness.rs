/// Harness Loader - Per-Attempt Isolation Harness
///
/// **Core Responsibility:**
/// Render the single self-contained Python source file that one isolation
/// process executes: restricted namespace, capability guard, candidate and
/// harness loading in a fixed order, the deadline-checked test-case loop,
/// outcome classification, and the one-line result emission.
///
/// **Boundary discipline:**
/// The candidate's sources and the test suite are embedded as base64
/// literals, so the payload crosses the isolation boundary serialized and
/// no quoting of untrusted text can break the generated file. The real
/// stdout handle is captured before `sys.stdout`/`sys.stderr`/`sys.stdin`
/// are rebound to a write-only sink; the sentinel-prefixed result line on
/// that handle is the only observable channel out of the process.
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use gauntlet_common::EvaluationTask;

use crate::guard;

/// Prefix of the one result line the harness writes to the real stdout.
/// The supervisor takes the last line carrying it, and the harness emits
/// after the loop, so candidate writes cannot spoof the outcome.
pub const RESULT_MARKER: &str = "__GAUNTLET_RESULT__";

/// File name the harness is written under inside the attempt's scratch dir.
pub const HARNESS_FILE: &str = "harness.py";

/// Render the harness source for one attempt.
pub fn render(task: &EvaluationTask) -> Result<String, serde_json::Error> {
    let cases_json = serde_json::to_string(&task.test_cases)?;
    Ok(format!(
        r#"# Generated per attempt; executes exactly one evaluation and exits.
import base64 as _base64
import builtins as _builtins
import io as _io
import json as _json
import sys as _sys
import time as _time

_RESULT_MARKER = "{marker}"
_channel = _sys.stdout
_started = _time.monotonic()


class CapabilityViolation(BaseException):
    pass


class DeadlineExceeded(BaseException):
    pass


class _WriteOnlySink(_io.StringIO):
    def read(self, *args, **kwargs):
        raise IOError("sink is write-only")

    def readline(self, *args, **kwargs):
        raise IOError("sink is write-only")

    def readlines(self, *args, **kwargs):
        raise IOError("sink is write-only")

    def readable(self):
        return False


def _emit(status, runtime_seconds):
    _channel.write(_RESULT_MARKER + " " + _json.dumps(
        {{"status": status, "runtime_seconds": runtime_seconds}}) + "\n")
    _channel.flush()

{guard}

_sink = _WriteOnlySink()
_sys.stdout = _sink
_sys.stderr = _sink
_sys.stdin = _sink

_PRELUDE = """
import re
import itertools
import collections
import heapq
import bisect
import string
import math
import functools
import copy

from math import floor, ceil, factorial, sqrt, inf
from sys import maxsize
from bisect import bisect_left, bisect_right
from itertools import permutations, zip_longest
from heapq import heappush, heappop, heapify
from collections import deque, defaultdict, OrderedDict, Counter
from typing import List, Optional, Tuple
from functools import lru_cache, cache


class ListNode(object):
    def __init__(self, val=0, next=None):
        self.val = val
        self.next = next


class TreeNode(object):
    def __init__(self, val=0, left=None, right=None):
        self.val = val
        self.left = left
        self.right = right


def print(*args, **kwargs):
    pass
"""

_namespace = {{}}
exec(_PRELUDE, _namespace)

_solution_src = _base64.b64decode("{solution_b64}").decode("utf-8")
_convert_src = _base64.b64decode("{convert_b64}").decode("utf-8")
_evaluate_src = _base64.b64decode("{evaluate_b64}").decode("utf-8")
_entry_point = _base64.b64decode("{entry_b64}").decode("utf-8")
_test_cases = _json.loads(_base64.b64decode("{cases_b64}").decode("utf-8"))
_timeout_seconds = {timeout}

_total = 0
_passed = 0
_status = None
try:
    try:
        exec(_solution_src, _namespace)
        exec("solution = Solution()", _namespace)
        exec(_convert_src, _namespace)
        exec(_evaluate_src, _namespace)
    except Exception:
        pass

    _deadline = _time.monotonic() + _timeout_seconds
    for _case in _test_cases:
        if _time.monotonic() >= _deadline:
            raise DeadlineExceeded()
        _total += 1
        try:
            _inputs, _expected = _namespace["convert_offline"](
                (_case["input"], _case["expected"]))
            _outputs = getattr(_namespace["solution"], _entry_point)(*_inputs)
            if _namespace["evaluate_offline"](_inputs, _outputs, _expected):
                _passed += 1
        except Exception:
            pass
    if _total == _passed and _total > 0:
        _status = "passed"
    else:
        _status = "failed"
except DeadlineExceeded:
    _status = "timed_out"
except CapabilityViolation as _violation:
    _status = "fatal:" + str(_violation)
except BaseException as _fault:
    _status = "fatal:" + type(_fault).__name__ + ": " + str(_fault)

_emit(_status, _time.monotonic() - _started)
"#,
        marker = RESULT_MARKER,
        guard = guard::GUARD_PREAMBLE,
        solution_b64 = BASE64.encode(&task.solution_source),
        convert_b64 = BASE64.encode(&task.convert_source),
        evaluate_b64 = BASE64.encode(&task.evaluate_source),
        entry_b64 = BASE64.encode(&task.entry_point),
        cases_b64 = BASE64.encode(&cases_json),
        timeout = format!("{:?}", task.timeout_seconds),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_common::TestCase;

    fn sample_task() -> EvaluationTask {
        EvaluationTask {
            task_id: "sample".into(),
            attempt_index: 0,
            solution_source: "class Solution:\n    def solve(self, x):\n        return x\n"
                .into(),
            convert_source: "def convert_offline(pair):\n    return pair\n".into(),
            evaluate_source:
                "def evaluate_offline(inputs, outputs, expected):\n    return outputs == expected\n"
                    .into(),
            entry_point: "solve".into(),
            test_cases: vec![TestCase {
                input: serde_json::json!([1]),
                expected: serde_json::json!(1),
            }],
            timeout_seconds: 2.5,
        }
    }

    #[test]
    fn render_embeds_payload_as_base64() {
        let task = sample_task();
        let source = render(&task).unwrap();
        assert!(source.contains(&BASE64.encode(&task.solution_source)));
        assert!(source.contains(&BASE64.encode(&task.entry_point)));
        // Raw candidate text never appears verbatim in the generated file.
        assert!(!source.contains("class Solution:"));
    }

    #[test]
    fn render_includes_guard_and_marker() {
        let source = render(&sample_task()).unwrap();
        assert!(source.contains(RESULT_MARKER));
        assert!(source.contains("raise CapabilityViolation"));
        assert!(source.contains("_timeout_seconds = 2.5"));
    }

    #[test]
    fn render_arms_deadline_before_the_loop() {
        let source = render(&sample_task()).unwrap();
        let deadline = source.find("_deadline = _time.monotonic()").unwrap();
        let loop_start = source.find("for _case in _test_cases:").unwrap();
        assert!(deadline < loop_start);
    }

    #[test]
    fn render_loads_in_contract_order() {
        let source = render(&sample_task()).unwrap();
        let solution = source.find("exec(_solution_src").unwrap();
        let instantiate = source.find("solution = Solution()").unwrap();
        let convert = source.find("exec(_convert_src").unwrap();
        let evaluate = source.find("exec(_evaluate_src").unwrap();
        assert!(solution < instantiate && instantiate < convert && convert < evaluate);
    }
}
