//! Pure-JS glue laid over the native functions `webapi::register` installs:
//! the parts of the Web API surface (spec §6) that need no Rust state at
//! all, or only need a thin `Promise`/class wrapper around a native call.
//!
//! Grounded on `jhead-bevy-react`'s `js/engine.rs` `register_environment_shims`
//! string constant for the "evaluate one JS source blob at startup" shape.

pub const SOURCE: &str = r#"
(function() {
  'use strict';

  globalThis.performance = {
    now: function() { return __host_performance_now(); }
  };

  globalThis.fetch = function(url, _options) {
    return new Promise(function(resolve) {
      __host_fetch(url, function(response) {
        response.headers = {
          get: function(name) {
            var lower = String(name).toLowerCase();
            for (var key in response.headers) {
              if (key.toLowerCase() === lower) return response.headers[key];
            }
            return null;
          }
        };
        response.arrayBuffer = function() { return Promise.resolve(response.data); };
        response.text = function() {
          return Promise.resolve(response.data === null ? '' : utf8Decode(new Uint8Array(response.data)));
        };
        response.json = function() { return response.text().then(function(text) { return JSON.parse(text); }); };
        response.blob = function() { return Promise.resolve(new Blob([response.data])); };
        resolve(response);
      });
    });
  };

  globalThis.readFile = function(path) {
    return new Promise(function(resolve) {
      __host_read_file(path, function(result) {
        resolve(result);
      });
    });
  };

  function makeTarget(name) {
    return {
      addEventListener: function(type, cb, options) {
        var capture = typeof options === 'boolean' ? options : !!(options && options.capture);
        __host_add_event_listener(name, type, cb, capture);
      },
      removeEventListener: function(type, cb, options) {
        var capture = typeof options === 'boolean' ? options : !!(options && options.capture);
        __host_remove_event_listener(name, type, cb, capture);
      }
    };
  }

  var documentTarget = makeTarget('document');
  var windowTarget = makeTarget('window');
  var canvasTarget = makeTarget('canvas');

  globalThis.document = Object.assign(documentTarget, {
    getElementById: function(id) {
      if (id === 'canvas' || id === 'game' || id === 'app') return globalThis.canvas;
      return null;
    },
    createElement: function(tag) {
      if (String(tag).toLowerCase() === 'canvas') return globalThis.canvas;
      return Object.assign(makeTarget('document'), { tagName: String(tag).toUpperCase() });
    }
  });

  globalThis.window = Object.assign(windowTarget, {
    innerWidth: globalThis.__initialWidth || 800,
    innerHeight: globalThis.__initialHeight || 600,
    devicePixelRatio: 1
  });

  globalThis.canvas = Object.assign(canvasTarget, {
    width: globalThis.window.innerWidth,
    height: globalThis.window.innerHeight,
    getContext: function(kind) {
      if (kind === 'webgpu') {
        return { configure: function() {}, getCurrentTexture: function() { return {}; } };
      }
      return null;
    },
    getBoundingClientRect: function() {
      return { x: 0, y: 0, width: this.width, height: this.height, top: 0, left: 0, right: this.width, bottom: this.height };
    },
    toDataURL: function() { return 'data:image/png;base64,'; }
  });

  globalThis.navigator = {
    gpu: {
      requestAdapter: function() { return Promise.resolve(null); }
    },
    getGamepads: function() { return []; }
  };

  function utf8Encode(str) {
    var bytes = [];
    for (var i = 0; i < str.length; i++) {
      var code = str.charCodeAt(i);
      if (code < 0x80) {
        bytes.push(code);
      } else if (code < 0x800) {
        bytes.push(0xc0 | (code >> 6), 0x80 | (code & 0x3f));
      } else if (code >= 0xd800 && code <= 0xdbff && i + 1 < str.length) {
        var next = str.charCodeAt(i + 1);
        if (next >= 0xdc00 && next <= 0xdfff) {
          i++;
          var combined = 0x10000 + ((code - 0xd800) << 10) + (next - 0xdc00);
          bytes.push(
            0xf0 | (combined >> 18),
            0x80 | ((combined >> 12) & 0x3f),
            0x80 | ((combined >> 6) & 0x3f),
            0x80 | (combined & 0x3f)
          );
        } else {
          bytes.push(0xe0 | (code >> 12), 0x80 | ((code >> 6) & 0x3f), 0x80 | (code & 0x3f));
        }
      } else {
        bytes.push(0xe0 | (code >> 12), 0x80 | ((code >> 6) & 0x3f), 0x80 | (code & 0x3f));
      }
    }
    return new Uint8Array(bytes);
  }

  function utf8Decode(bytes) {
    var out = '';
    var i = 0;
    while (i < bytes.length) {
      var b0 = bytes[i];
      if (b0 < 0x80) {
        out += String.fromCharCode(b0);
        i += 1;
      } else if ((b0 & 0xe0) === 0xc0) {
        out += String.fromCharCode(((b0 & 0x1f) << 6) | (bytes[i + 1] & 0x3f));
        i += 2;
      } else if ((b0 & 0xf0) === 0xe0) {
        out += String.fromCharCode(((b0 & 0x0f) << 12) | ((bytes[i + 1] & 0x3f) << 6) | (bytes[i + 2] & 0x3f));
        i += 3;
      } else {
        var point = ((b0 & 0x07) << 18) | ((bytes[i + 1] & 0x3f) << 12) | ((bytes[i + 2] & 0x3f) << 6) | (bytes[i + 3] & 0x3f);
        point -= 0x10000;
        out += String.fromCharCode(0xd800 + (point >> 10), 0xdc00 + (point & 0x3ff));
        i += 4;
      }
    }
    return out;
  }

  globalThis.TextEncoder = function() {};
  globalThis.TextEncoder.prototype.encode = function(str) { return utf8Encode(String(str || '')); };

  globalThis.TextDecoder = function() {};
  globalThis.TextDecoder.prototype.decode = function(bytes) { return utf8Decode(bytes || []); };

  // Minimal `Blob`: concatenates its parts (ArrayBuffers, typed arrays or
  // strings) into one owned buffer. No slicing/streaming support, just
  // enough for a `fetch`/`readFile` response to be wrapped and read back.
  function Blob(parts, options) {
    var chunks = [];
    var total = 0;
    (parts || []).forEach(function(part) {
      var view = part instanceof Uint8Array ? part : new Uint8Array(
        typeof part === 'string' ? utf8Encode(part).buffer : part
      );
      chunks.push(view);
      total += view.length;
    });
    var merged = new Uint8Array(total);
    var offset = 0;
    chunks.forEach(function(view) {
      merged.set(view, offset);
      offset += view.length;
    });
    this._bytes = merged;
    this.size = total;
    this.type = (options && options.type) || '';
  }
  Blob.prototype.arrayBuffer = function() { return Promise.resolve(this._bytes.buffer); };
  Blob.prototype.text = function() { return Promise.resolve(utf8Decode(this._bytes)); };
  globalThis.Blob = Blob;

  function AudioContext() {
    this.currentTime = 0;
    this.destination = {};
  }
  AudioContext.prototype.createGain = function() {
    return { gain: { value: 1 }, connect: function() {}, disconnect: function() {} };
  };
  AudioContext.prototype.createOscillator = function() {
    return { frequency: { value: 440 }, connect: function() {}, start: function() {}, stop: function() {} };
  };
  AudioContext.prototype.createBufferSource = function() {
    return { buffer: null, connect: function() {}, start: function() {}, stop: function() {} };
  };
  globalThis.AudioContext = AudioContext;

  // Same-thread polyfill: there is only one JS realm in this runtime, so a
  // worker script runs in the same global scope, synchronously, as soon as
  // it's constructed. `globalThis.postMessage`/`onmessage` are what that
  // script sees as "its side" of the channel; saved and restored around the
  // load so that constructing worker B doesn't clobber worker A's handler.
  function Worker(scriptPath) {
    this._listeners = [];
    this.onmessage = null;
    var worker = this;

    var savedPostMessage = globalThis.postMessage;
    var savedOnMessage = globalThis.onmessage;
    globalThis.onmessage = null;
    globalThis.postMessage = function(data) {
      Promise.resolve().then(function() {
        if (typeof worker.onmessage === 'function') worker.onmessage({ data: data });
        for (var i = 0; i < worker._listeners.length; i++) worker._listeners[i]({ data: data });
      });
    };

    __host_run_worker_script(scriptPath);
    this._deliverToWorker = globalThis.onmessage;

    globalThis.postMessage = savedPostMessage;
    globalThis.onmessage = savedOnMessage;
  }
  Worker.prototype.postMessage = function(data) {
    var deliver = this._deliverToWorker;
    Promise.resolve().then(function() {
      if (typeof deliver === 'function') deliver({ data: data });
    });
  };
  Worker.prototype.addEventListener = function(type, cb) {
    if (type === 'message') this._listeners.push(cb);
  };
  Worker.prototype.terminate = function() {
    this._listeners = [];
    this.onmessage = null;
    this._deliverToWorker = null;
  };
  globalThis.Worker = Worker;
})();
"#;
